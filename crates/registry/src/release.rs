use serde::{Deserialize, Serialize};

use pkgmg_core::{Entity, PackageName, ReleaseId, VersionName};

/// An immutable, versioned artifact reference belonging to exactly one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: ReleaseId,
    pub version: VersionName,
    pub package: PackageName,
    pub data_hash: String,
}

impl Release {
    /// Build a release, deriving its id from `version` and `package`.
    pub fn new(version: VersionName, package: PackageName, data_hash: impl Into<String>) -> Self {
        Self {
            id: ReleaseId::compose(&version, &package),
            version,
            package,
            data_hash: data_hash.into(),
        }
    }

    /// Describe which fields differ from `other`, or `None` if they match.
    ///
    /// Used to tell an exact duplicate delivery apart from a conflicting one.
    pub fn diff(&self, other: &Release) -> Option<String> {
        let mut fields = Vec::new();
        if self.version != other.version {
            fields.push(format!("version {:?} != {:?}", self.version.as_str(), other.version.as_str()));
        }
        if self.package != other.package {
            fields.push(format!("package {:?} != {:?}", self.package.as_str(), other.package.as_str()));
        }
        if self.data_hash != other.data_hash {
            fields.push(format!("dataHash {:?} != {:?}", self.data_hash, other.data_hash));
        }

        if fields.is_empty() {
            None
        } else {
            Some(fields.join(", "))
        }
    }
}

impl Entity for Release {
    type Id = ReleaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
