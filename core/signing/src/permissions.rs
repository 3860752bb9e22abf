//! Actions and the permission sets they grant.

use serde::{Deserialize, Serialize};
use std::fmt;

use filestore_common::{Error, Result};

/// Action a capability URL is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudStorageAction {
    Download,
    Upload,
    Delete,
}

impl fmt::Display for CloudStorageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// Object-level permissions carried by a signature.
///
/// Rendered in canonical `racwd` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
}

impl Permissions {
    /// The narrowest permission set that allows `action`.
    pub fn for_action(action: CloudStorageAction) -> Self {
        match action {
            CloudStorageAction::Download => Self {
                read: true,
                ..Self::default()
            },
            CloudStorageAction::Upload => Self {
                add: true,
                create: true,
                write: true,
                ..Self::default()
            },
            CloudStorageAction::Delete => Self {
                delete: true,
                ..Self::default()
            },
        }
    }

    /// Parse the `sp` query value.
    ///
    /// # Errors
    /// - Unknown permission letter
    /// - Letters out of canonical order or repeated
    pub fn parse(value: &str) -> Result<Self> {
        let mut permissions = Self::default();
        let mut last = None;

        for c in value.chars() {
            let rank = match c {
                'r' => 0,
                'a' => 1,
                'c' => 2,
                'w' => 3,
                'd' => 4,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "Unknown permission '{}' in '{}'",
                        c, value
                    )))
                }
            };
            if last.is_some_and(|l| rank <= l) {
                return Err(Error::InvalidInput(format!(
                    "Permissions '{}' are not in canonical order",
                    value
                )));
            }
            last = Some(rank);

            match c {
                'r' => permissions.read = true,
                'a' => permissions.add = true,
                'c' => permissions.create = true,
                'w' => permissions.write = true,
                _ => permissions.delete = true,
            }
        }

        Ok(permissions)
    }

    /// Whether every permission in `other` is also granted here.
    pub fn contains(&self, other: Permissions) -> bool {
        (!other.read || self.read)
            && (!other.add || self.add)
            && (!other.create || self.create)
            && (!other.write || self.write)
            && (!other.delete || self.delete)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
        ];
        for (granted, letter) in flags {
            if granted {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_permissions() {
        assert_eq!(
            Permissions::for_action(CloudStorageAction::Download).to_string(),
            "r"
        );
        assert_eq!(
            Permissions::for_action(CloudStorageAction::Upload).to_string(),
            "acw"
        );
        assert_eq!(
            Permissions::for_action(CloudStorageAction::Delete).to_string(),
            "d"
        );
    }

    #[test]
    fn test_actions_do_not_overlap() {
        let download = Permissions::for_action(CloudStorageAction::Download);
        let upload = Permissions::for_action(CloudStorageAction::Upload);
        let delete = Permissions::for_action(CloudStorageAction::Delete);

        assert!(!download.write && !download.create && !download.add && !download.delete);
        assert!(!upload.delete && !upload.read);
        assert!(!delete.read && !delete.write);
        assert!(!download.contains(upload));
        assert!(!upload.contains(delete));
    }

    #[test]
    fn test_parse_roundtrip() {
        for action in [
            CloudStorageAction::Download,
            CloudStorageAction::Upload,
            CloudStorageAction::Delete,
        ] {
            let permissions = Permissions::for_action(action);
            assert_eq!(Permissions::parse(&permissions.to_string()).unwrap(), permissions);
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Permissions::parse("x").is_err());
        assert!(Permissions::parse("wa").is_err());
        assert!(Permissions::parse("rr").is_err());
    }
}
