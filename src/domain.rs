//! Validated scalar types used by options records.
//!
//! Newtypes keep obviously-wrong values (empty module names, zero packet
//! budgets) out of the runtime at construction time instead of at first use.

use nutype::nutype;

/// Name of a running module, as it appears in heartbeats and the
/// connection-information registry.
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into,
        AsRef
    )
)]
pub struct ModuleName(String);

/// Per-channel packet budget of the capped collection.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct MaxPackets(usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_rejects_empty() {
        assert!(ModuleName::try_new(String::new()).is_err());
        assert!(ModuleName::try_new("packetCache".to_string()).is_ok());
    }

    #[test]
    fn max_packets_must_be_positive() {
        assert!(MaxPackets::try_new(0).is_err());
        assert_eq!(MaxPackets::try_new(100).unwrap().into_inner(), 100);
    }
}
