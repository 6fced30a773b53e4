//! Parsing of `<IPBlock>-<RegisterGroup>-<Name>` identifiers.

use std::fmt;

use sdconfig::UID_DELIMITER;

use crate::SdcError;

/// Structured form of a register or field unique identifier.
///
/// The first two delimiters are structural; the leaf name keeps any further
/// hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uid<'a> {
    pub ip_block: &'a str,
    pub group: &'a str,
    pub name: &'a str,
}

impl<'a> Uid<'a> {
    pub fn parse(uid: &'a str) -> Result<Self, SdcError> {
        let mut parts = uid.splitn(3, UID_DELIMITER);
        let (Some(ip_block), Some(group), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SdcError::UnknownIdentifier(uid.to_string()));
        };
        if ip_block.is_empty() || group.is_empty() || name.is_empty() {
            return Err(SdcError::UnknownIdentifier(uid.to_string()));
        }
        Ok(Uid {
            ip_block,
            group,
            name,
        })
    }
}

impl fmt::Display for Uid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{UID_DELIMITER}{}{UID_DELIMITER}{}",
            self.ip_block, self.group, self.name
        )
    }
}
