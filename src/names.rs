//! Add-in names: a basic name, an optional internal name, and one slot per
//! locale.  Unset slots fall back to the basic name when the header is
//! filled.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("Unknown language code '{0}' (expected basic, internal, en, es, de, fr, pt, zh, un1 or un2)")]
    UnknownLocale(String),
}

/// Locale slots, in header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    En,
    Es,
    De,
    Fr,
    Pt,
    Zh,
    /// Two trailing slots with no known language; the loader shows English.
    Un1,
    Un2,
}

impl Locale {
    pub const ALL: [Locale; 8] = [
        Locale::En,
        Locale::Es,
        Locale::De,
        Locale::Fr,
        Locale::Pt,
        Locale::Zh,
        Locale::Un1,
        Locale::Un2,
    ];

    /// Slot index within the header's localized name table.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> &'static str {
        match self {
            Locale::En  => "en",
            Locale::Es  => "es",
            Locale::De  => "de",
            Locale::Fr  => "fr",
            Locale::Pt  => "pt",
            Locale::Zh  => "zh",
            Locale::Un1 => "un1",
            Locale::Un2 => "un2",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == s)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which name an assignment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSlot {
    Basic,
    Internal,
    Localized(Locale),
}

impl FromStr for NameSlot {
    type Err = NameError;

    /// `""` is an alias for `basic`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "basic" => Ok(NameSlot::Basic),
            "internal"   => Ok(NameSlot::Internal),
            code => Locale::from_code(code)
                .map(NameSlot::Localized)
                .ok_or_else(|| NameError::UnknownLocale(code.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedNames {
    pub basic:     String,
    pub internal:  Option<String>,
    pub localized: [Option<String>; 8],
}

impl LocalizedNames {
    pub fn new(basic: impl Into<String>) -> Self {
        Self { basic: basic.into(), ..Self::default() }
    }

    pub fn set(&mut self, slot: NameSlot, value: impl Into<String>) {
        let value = value.into();
        match slot {
            NameSlot::Basic         => self.basic = value,
            NameSlot::Internal      => self.internal = Some(value),
            NameSlot::Localized(lc) => self.localized[lc.index()] = Some(value),
        }
    }

    /// Apply an `lc:name` assignment.  Text without a colon sets the basic
    /// name.
    pub fn assign(&mut self, spec: &str) -> Result<(), NameError> {
        match spec.split_once(':') {
            Some((key, value)) => {
                let slot = key.parse()?;
                self.set(slot, value);
            }
            None => self.set(NameSlot::Basic, spec),
        }
        Ok(())
    }

    /// Localized name, or the basic name if the slot is unset.
    pub fn resolve(&self, locale: Locale) -> &str {
        self.localized[locale.index()].as_deref().unwrap_or(&self.basic)
    }

    /// Source text for the internal name: the explicit one, else basic.
    pub fn internal_source(&self) -> &str {
        self.internal.as_deref().unwrap_or(&self.basic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_codes_round_trip() {
        for lc in Locale::ALL {
            assert_eq!(Locale::from_code(lc.code()), Some(lc));
        }
        assert_eq!(Locale::Zh.index(), 5);
        assert_eq!(Locale::from_code("jp"), None);
    }

    #[test]
    fn assignments() {
        let mut names = LocalizedNames::new("calc.g3a");
        names.assign("en:Calculator").unwrap();
        names.assign("internal:calc").unwrap();
        names.assign(":Basic").unwrap();
        assert_eq!(names.basic, "Basic");
        assert_eq!(names.internal.as_deref(), Some("calc"));
        assert_eq!(names.resolve(Locale::En), "Calculator");
        assert_eq!(names.resolve(Locale::De), "Basic");

        names.assign("Plain").unwrap();
        assert_eq!(names.basic, "Plain");
    }

    #[test]
    fn value_may_contain_colons() {
        let mut names = LocalizedNames::default();
        names.assign("fr:a:b").unwrap();
        assert_eq!(names.resolve(Locale::Fr), "a:b");
    }

    #[test]
    fn unknown_locale_is_rejected() {
        let mut names = LocalizedNames::default();
        assert_eq!(names.assign("xx:foo"), Err(NameError::UnknownLocale("xx".into())));
    }

    #[test]
    fn internal_falls_back_to_basic() {
        let mut names = LocalizedNames::new("conv");
        assert_eq!(names.internal_source(), "conv");
        names.set(NameSlot::Internal, "other");
        assert_eq!(names.internal_source(), "other");
    }
}
