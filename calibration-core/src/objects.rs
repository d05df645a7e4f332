//! Object identifiers and the info-block object table.
//!
//! Every register block on a maXTouch device is an "object" identified by a
//! numeric type (`T6`, `T66`, ...). The info block read from address zero lists
//! each object's start address, size, instance count, and how many report IDs
//! it owns. Device messages carry a report ID as their first byte; the table
//! built here maps those IDs back to the object that produced them.

use core::fmt;
use core::ops::RangeInclusive;

use heapless::Vec;
use winnow::binary::{le_u16, u8 as byte};
use winnow::error::ContextError;
use winnow::prelude::*;

/// Numeric object type as listed in the device info block.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectType(pub u8);

impl ObjectType {
    pub const GEN_MESSAGEPROCESSOR_T5: Self = Self(5);
    pub const GEN_COMMANDPROCESSOR_T6: Self = Self(6);
    pub const GEN_POWERCONFIG_T7: Self = Self(7);
    pub const TOUCH_MULTITOUCHSCREEN_T9: Self = Self(9);
    pub const SPT_MESSAGECOUNT_T44: Self = Self(44);
    pub const SPT_GOLDENREFERENCES_T66: Self = Self(66);

    /// Returns the raw type number.
    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Resolves object addresses and message origins for a device.
pub trait ObjectDirectory {
    /// Returns the register address of `instance` of `object`, if present.
    fn address_of(&self, object: ObjectType, instance: u8) -> Option<u16>;

    /// Maps a message report ID to the object type that owns it.
    fn object_type_of(&self, report_id: u8) -> Option<ObjectType>;
}

impl<D> ObjectDirectory for &D
where
    D: ObjectDirectory + ?Sized,
{
    fn address_of(&self, object: ObjectType, instance: u8) -> Option<u16> {
        (**self).address_of(object, instance)
    }

    fn object_type_of(&self, report_id: u8) -> Option<ObjectType> {
        (**self).object_type_of(report_id)
    }
}

/// Length of the identification header that precedes the object table.
pub const INFO_HEADER_LEN: usize = 7;
/// Length of a single object table record.
pub const OBJECT_ENTRY_LEN: usize = 6;
/// Upper bound on objects tracked per device.
pub const MAX_OBJECTS: usize = 64;

/// First report ID handed out; zero is reserved.
const FIRST_REPORT_ID: u16 = 1;
/// Report ID the device uses to signal an empty message slot.
pub const INVALID_REPORT_ID: u8 = 0xFF;

/// Identification header at the start of the info block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InfoHeader {
    pub family_id: u8,
    pub variant_id: u8,
    pub version: u8,
    pub build: u8,
    pub matrix_x_size: u8,
    pub matrix_y_size: u8,
    pub object_count: u8,
}

/// One record of the object table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectEntry {
    pub object_type: ObjectType,
    pub start_address: u16,
    pub size_minus_one: u8,
    pub instances_minus_one: u8,
    pub report_ids_per_instance: u8,
}

impl ObjectEntry {
    #[must_use]
    pub const fn new(
        object_type: ObjectType,
        start_address: u16,
        size_minus_one: u8,
        instances_minus_one: u8,
        report_ids_per_instance: u8,
    ) -> Self {
        Self {
            object_type,
            start_address,
            size_minus_one,
            instances_minus_one,
            report_ids_per_instance,
        }
    }

    /// Size of one instance in bytes.
    #[must_use]
    pub const fn size(&self) -> u16 {
        self.size_minus_one as u16 + 1
    }

    /// Number of instances of this object on the device.
    #[must_use]
    pub const fn instances(&self) -> u16 {
        self.instances_minus_one as u16 + 1
    }

    /// Total report IDs owned by all instances.
    #[must_use]
    pub const fn report_id_count(&self) -> u16 {
        self.report_ids_per_instance as u16 * self.instances()
    }

    /// Register address of `instance`, or `None` when the instance does not exist.
    #[must_use]
    pub fn address_of_instance(&self, instance: u8) -> Option<u16> {
        if u16::from(instance) >= self.instances() {
            return None;
        }
        self.start_address.checked_add(u16::from(instance) * self.size())
    }
}

/// Errors reported while building an [`ObjectTable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObjectTableError {
    /// The info block is shorter than its header claims.
    Truncated { expected: usize, found: usize },
    /// More objects than the table capacity.
    TableFull,
    /// The objects claim more report IDs than fit in a byte.
    ReportIdsExhausted,
}

impl fmt::Display for ObjectTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectTableError::Truncated { expected, found } => {
                write!(
                    f,
                    "info block truncated: expected {expected} bytes, found {found}"
                )
            }
            ObjectTableError::TableFull => f.write_str("object table full"),
            ObjectTableError::ReportIdsExhausted => f.write_str("report ids exhausted"),
        }
    }
}

/// Object table parsed from the device info block.
#[derive(Clone, Debug, Default)]
pub struct ObjectTable<const CAPACITY: usize = MAX_OBJECTS> {
    entries: Vec<ObjectEntry, CAPACITY>,
    report_ids_used: u16,
}

impl<const CAPACITY: usize> ObjectTable<CAPACITY> {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            report_ids_used: 0,
        }
    }

    /// Parses an info block (header followed by object records).
    ///
    /// Trailing bytes after the last record, such as the info-block CRC, are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectTableError::Truncated`] when `bytes` ends before the
    /// last record, or the error from [`Self::push`] for a record that does
    /// not fit.
    pub fn parse(bytes: &[u8]) -> Result<(InfoHeader, Self), ObjectTableError> {
        let mut input = bytes;
        let header = info_header
            .parse_next(&mut input)
            .map_err(|_| ObjectTableError::Truncated {
                expected: INFO_HEADER_LEN,
                found: bytes.len(),
            })?;

        let expected = INFO_HEADER_LEN + usize::from(header.object_count) * OBJECT_ENTRY_LEN;
        if bytes.len() < expected {
            return Err(ObjectTableError::Truncated {
                expected,
                found: bytes.len(),
            });
        }

        let mut table = Self::new();
        for _ in 0..header.object_count {
            let entry = object_entry
                .parse_next(&mut input)
                .map_err(|_| ObjectTableError::Truncated {
                    expected,
                    found: bytes.len(),
                })?;
            table.push(entry)?;
        }

        Ok((header, table))
    }

    /// Appends an object record, allocating its report IDs after the existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectTableError::TableFull`] when the table is at capacity
    /// and [`ObjectTableError::ReportIdsExhausted`] when the record's report
    /// IDs would reach [`INVALID_REPORT_ID`].
    pub fn push(&mut self, entry: ObjectEntry) -> Result<(), ObjectTableError> {
        let used = self.report_ids_used + entry.report_id_count();
        // Report IDs must stay below the "no message" marker.
        if FIRST_REPORT_ID + used > u16::from(INVALID_REPORT_ID) {
            return Err(ObjectTableError::ReportIdsExhausted);
        }
        self.entries
            .push(entry)
            .map_err(|_| ObjectTableError::TableFull)?;
        self.report_ids_used = used;
        Ok(())
    }

    /// Looks up the record for `object`.
    #[must_use]
    pub fn find(&self, object: ObjectType) -> Option<&ObjectEntry> {
        self.entries
            .iter()
            .find(|entry| entry.object_type == object)
    }

    /// Returns the report IDs owned by `object`, if it has any.
    #[must_use]
    pub fn report_ids(&self, object: ObjectType) -> Option<RangeInclusive<u8>> {
        self.allocations()
            .find(|(entry, _)| entry.object_type == object)
            .map(|(_, range)| range)
    }

    /// Returns the records in table order.
    #[must_use]
    pub fn entries(&self) -> &[ObjectEntry] {
        &self.entries
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn allocations(&self) -> impl Iterator<Item = (&ObjectEntry, RangeInclusive<u8>)> + '_ {
        let mut next = FIRST_REPORT_ID;
        self.entries.iter().filter_map(move |entry| {
            let count = entry.report_id_count();
            if count == 0 {
                return None;
            }
            let first = next;
            next += count;
            // `push` keeps every allocation below `INVALID_REPORT_ID`.
            let first = u8::try_from(first).ok()?;
            let last = u8::try_from(next - 1).ok()?;
            Some((entry, first..=last))
        })
    }
}

impl<const CAPACITY: usize> ObjectDirectory for ObjectTable<CAPACITY> {
    fn address_of(&self, object: ObjectType, instance: u8) -> Option<u16> {
        self.find(object)?.address_of_instance(instance)
    }

    fn object_type_of(&self, report_id: u8) -> Option<ObjectType> {
        self.allocations()
            .find(|(_, range)| range.contains(&report_id))
            .map(|(entry, _)| entry.object_type)
    }
}

#[allow(clippy::similar_names)]
fn info_header(input: &mut &[u8]) -> Result<InfoHeader, ContextError> {
    let (family_id, variant_id, version, build) = (byte, byte, byte, byte).parse_next(input)?;
    let (matrix_x_size, matrix_y_size, object_count) = (byte, byte, byte).parse_next(input)?;

    Ok(InfoHeader {
        family_id,
        variant_id,
        version,
        build,
        matrix_x_size,
        matrix_y_size,
        object_count,
    })
}

fn object_entry(input: &mut &[u8]) -> Result<ObjectEntry, ContextError> {
    let (object_type, start_address) = (byte, le_u16).parse_next(input)?;
    let (size_minus_one, instances_minus_one, report_ids) = (byte, byte, byte).parse_next(input)?;

    Ok(ObjectEntry::new(
        ObjectType(object_type),
        start_address,
        size_minus_one,
        instances_minus_one,
        report_ids,
    ))
}
