use serde::{Deserialize, Serialize};

use pkgmg_core::{Address, Entity, PackageName, ReleaseId};

/// A named, owned unit of distribution tracked by the registry.
///
/// `name` and `owner` never change after creation. `default_version` is `None`
/// until an event designates a release; once set it always names a release of
/// this package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub name: PackageName,
    pub owner: Address,
    pub default_version: Option<ReleaseId>,
}

impl Package {
    /// A freshly created package with no default version.
    pub fn new(name: PackageName, owner: Address) -> Self {
        Self {
            name,
            owner,
            default_version: None,
        }
    }
}

impl Entity for Package {
    type Id = PackageName;

    fn id(&self) -> &Self::Id {
        &self.name
    }
}
