use serde::{Deserialize, Serialize};

use pkgmg_core::{Address, PackageName, ReleaseId, VersionName};
use pkgmg_events::Event;

/// Event: PackageCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCreated {
    pub owner: Address,
    pub pkg_name: PackageName,
}

/// Event: PackageVersionCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersionCreated {
    pub pkg_name: PackageName,
    pub version_name: VersionName,
    pub data_hash: String,
    #[serde(default)]
    pub change_default_version: bool,
}

impl PackageVersionCreated {
    pub fn release_id(&self) -> ReleaseId {
        ReleaseId::compose(&self.version_name, &self.pkg_name)
    }
}

/// Event: DefaultVersionChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultVersionChanged {
    pub pkg_name: PackageName,
    pub version_name: VersionName,
}

impl DefaultVersionChanged {
    pub fn release_id(&self) -> ReleaseId {
        ReleaseId::compose(&self.version_name, &self.pkg_name)
    }
}

/// Events emitted by the registry authority, as they appear in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    PackageCreated(PackageCreated),
    PackageVersionCreated(PackageVersionCreated),
    DefaultVersionChanged(DefaultVersionChanged),
}

impl RegistryEvent {
    pub fn package_created(owner: Address, pkg_name: impl Into<PackageName>) -> Self {
        Self::PackageCreated(PackageCreated {
            owner,
            pkg_name: pkg_name.into(),
        })
    }

    pub fn package_version_created(
        pkg_name: impl Into<PackageName>,
        version_name: impl Into<VersionName>,
        data_hash: impl Into<String>,
        change_default_version: bool,
    ) -> Self {
        Self::PackageVersionCreated(PackageVersionCreated {
            pkg_name: pkg_name.into(),
            version_name: version_name.into(),
            data_hash: data_hash.into(),
            change_default_version,
        })
    }

    pub fn default_version_changed(
        pkg_name: impl Into<PackageName>,
        version_name: impl Into<VersionName>,
    ) -> Self {
        Self::DefaultVersionChanged(DefaultVersionChanged {
            pkg_name: pkg_name.into(),
            version_name: version_name.into(),
        })
    }

    /// The package every registry event refers to.
    pub fn package(&self) -> &PackageName {
        match self {
            RegistryEvent::PackageCreated(e) => &e.pkg_name,
            RegistryEvent::PackageVersionCreated(e) => &e.pkg_name,
            RegistryEvent::DefaultVersionChanged(e) => &e.pkg_name,
        }
    }
}

impl Event for RegistryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::PackageCreated(_) => "registry.package.created",
            RegistryEvent::PackageVersionCreated(_) => "registry.package.version_created",
            RegistryEvent::DefaultVersionChanged(_) => "registry.package.default_version_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0x89205a3a3b2a69de6dbf7f01ed13b2108b2c43e7";

    #[test]
    fn decodes_contract_field_names() {
        let json = format!(r#"{{"type":"PackageCreated","owner":"{OWNER}","pkgName":"GenisPackage"}}"#);
        let ev: RegistryEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(
            ev,
            RegistryEvent::package_created(OWNER.parse().unwrap(), "GenisPackage")
        );
        assert_eq!(ev.event_type(), "registry.package.created");
    }

    #[test]
    fn change_default_version_defaults_to_false() {
        let json = r#"{"type":"PackageVersionCreated","pkgName":"p","versionName":"v1","dataHash":"h"}"#;
        let ev: RegistryEvent = serde_json::from_str(json).unwrap();

        match ev {
            RegistryEvent::PackageVersionCreated(e) => {
                assert!(!e.change_default_version);
                assert_eq!(e.release_id().as_str(), "v1p");
            }
            _ => panic!("Expected PackageVersionCreated event"),
        }
    }

    #[test]
    fn rejects_invalid_owner() {
        let json = r#"{"type":"PackageCreated","owner":"nobody","pkgName":"p"}"#;
        assert!(serde_json::from_str::<RegistryEvent>(json).is_err());
    }

    #[test]
    fn every_event_names_its_package() {
        let evs = [
            RegistryEvent::package_created(OWNER.parse().unwrap(), "a"),
            RegistryEvent::package_version_created("a", "v1", "h", true),
            RegistryEvent::default_version_changed("a", "v1"),
        ];
        assert!(evs.iter().all(|e| e.package().as_str() == "a"));
    }
}
