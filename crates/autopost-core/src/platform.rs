use serde::{Deserialize, Serialize};

/// The three platforms the assistant publishes to and tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Twitter,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Instagram, Platform::Twitter, Platform::Tiktok];

    /// Canonical lowercase name, matching the persisted column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the short aliases the chat commands use (/track ig …).
        match s {
            "instagram" | "ig" => Ok(Platform::Instagram),
            "twitter" | "tw" | "x" => Ok(Platform::Twitter),
            "tiktok" | "tt" => Ok(Platform::Tiktok),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_canonical_names() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn short_aliases_parse() {
        assert_eq!("ig".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!("tw".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!("tt".parse::<Platform>().unwrap(), Platform::Tiktok);
    }

    #[test]
    fn unknown_platform_rejected() {
        assert!("linkedin".parse::<Platform>().is_err());
    }
}
