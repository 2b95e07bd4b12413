//! Entity kinds of the id store.

use std::fmt;

use super::IdStoreError;

/// The kind of entity an id refers to.
///
/// The discriminants are the type tags used in the id store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdKind {
    String = 1,
    Person = 2,
    Link = 3,
    Node = 4,
    VehicleType = 5,
    Vehicle = 6,
    Int32 = 7,
    Int64 = 8,
    UInt32 = 9,
    Float32 = 10,
}

impl IdKind {
    /// All kinds, in tag order.
    pub const ALL: [IdKind; 10] = [
        IdKind::String,
        IdKind::Person,
        IdKind::Link,
        IdKind::Node,
        IdKind::VehicleType,
        IdKind::Vehicle,
        IdKind::Int32,
        IdKind::Int64,
        IdKind::UInt32,
        IdKind::Float32,
    ];

    /// Look up a kind by its file tag.
    ///
    /// # Errors
    ///
    /// Returns [`IdStoreError::UnknownTypeTag`] for tags outside 1..=10.
    pub fn from_tag(tag: u64) -> Result<Self, IdStoreError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or(IdStoreError::UnknownTypeTag(tag))
    }

    /// The tag written to the file for this kind.
    pub fn tag(self) -> u64 {
        self as u64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdKind::String => "string",
            IdKind::Person => "person",
            IdKind::Link => "link",
            IdKind::Node => "node",
            IdKind::VehicleType => "vehicle-type",
            IdKind::Vehicle => "vehicle",
            IdKind::Int32 => "int32",
            IdKind::Int64 => "int64",
            IdKind::UInt32 => "uint32",
            IdKind::Float32 => "float32",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in IdKind::ALL {
            assert_eq!(IdKind::from_tag(kind.tag()).unwrap(), kind);
        }
    }

    #[test]
    fn known_tags() {
        assert_eq!(IdKind::from_tag(3).unwrap(), IdKind::Link);
        assert_eq!(IdKind::from_tag(5).unwrap(), IdKind::VehicleType);
        assert_eq!(IdKind::from_tag(10).unwrap(), IdKind::Float32);
    }

    #[test]
    fn unknown_tags_rejected() {
        assert!(matches!(
            IdKind::from_tag(0),
            Err(IdStoreError::UnknownTypeTag(0))
        ));
        assert!(matches!(
            IdKind::from_tag(11),
            Err(IdStoreError::UnknownTypeTag(11))
        ));
        assert!(matches!(
            IdKind::from_tag(99),
            Err(IdStoreError::UnknownTypeTag(99))
        ));
    }

    #[test]
    fn display() {
        assert_eq!(IdKind::VehicleType.to_string(), "vehicle-type");
        assert_eq!(IdKind::Link.to_string(), "link");
    }
}
