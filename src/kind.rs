//! Ad unit kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdKind {
    AppOpen,
    Interstitial,
    Banner,
}

impl AdKind {
    pub const ALL: [Self; 3] = [Self::AppOpen, Self::Interstitial, Self::Banner];

    pub const FULL_SCREEN: [Self; 2] = [Self::AppOpen, Self::Interstitial];

    /// App-open and interstitial units cover the whole screen and are mutually
    /// exclusive with each other and with the banner.
    #[must_use]
    pub const fn is_full_screen(self) -> bool {
        matches!(self, Self::AppOpen | Self::Interstitial)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppOpen => "app_open",
            Self::Interstitial => "interstitial",
            Self::Banner => "banner",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::AppOpen => 0,
            Self::Interstitial => 1,
            Self::Banner => 2,
        }
    }
}

impl fmt::Display for AdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdKind {
    type Err = AdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "app_open" | "app-open" | "appopen" => Ok(Self::AppOpen),
            "interstitial" => Ok(Self::Interstitial),
            "banner" => Ok(Self::Banner),
            _ => Err(AdError::InvalidKind(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("APP-OPEN".parse::<AdKind>().unwrap(), AdKind::AppOpen);
        assert_eq!("appOpen".parse::<AdKind>().unwrap(), AdKind::AppOpen);
        assert_eq!(" Interstitial ".parse::<AdKind>().unwrap(), AdKind::Interstitial);
        assert!(matches!(
            "native".parse::<AdKind>(),
            Err(AdError::InvalidKind(_))
        ));
    }

    #[test]
    fn parse_table() {
        use crate::test_utils::{TestCase, run_table_tests};

        let cases = vec![
            TestCase { name: "snake", input: "app_open", expected: Some(AdKind::AppOpen) },
            TestCase { name: "banner", input: "banner", expected: Some(AdKind::Banner) },
            TestCase { name: "empty", input: "", expected: None },
            TestCase { name: "plural", input: "banners", expected: None },
        ];
        run_table_tests(cases, |input| input.parse::<AdKind>().ok()).unwrap();
    }

    #[test]
    fn indices_are_distinct_and_dense() {
        let mut seen = [false; 3];
        for kind in AdKind::ALL {
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert!(!AdKind::Banner.is_full_screen());
    }
}
