use std::fmt;

/// A `repo:/relative/path#asset_name` locator, the format the layers
/// above the store use to address an asset without a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUri {
    pub repo: String,
    pub path: String,
    pub asset: String,
}

impl AssetUri {
    /// Parse a URI. Returns None when the string does not have the
    /// `repo:/path#asset` shape. No existence checking is done.
    pub fn parse(uri: &str) -> Option<AssetUri> {
        let (repo, rest) = uri.split_once(":/")?;
        let (path, asset) = rest.split_once('#')?;
        if repo.contains('#') || asset.contains('#') || asset.is_empty() {
            return None;
        }
        Some(AssetUri {
            repo: repo.to_string(),
            path: path.to_string(),
            asset: asset.to_string(),
        })
    }
}

impl fmt::Display for AssetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}#{}", self.repo, self.path, self.asset)
    }
}

/// True iff the string has the basic shape of an asset URI.
pub fn is_valid_uri(uri: &str) -> bool {
    AssetUri::parse(uri).is_some()
}
