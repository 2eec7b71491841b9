//! The filter configuration and the candidate predicate.

use bitflags::bitflags;
use strum::{Display, EnumIter};

use crate::{instruction::BranchKind, watch::CandidateRecord, Error, Result};

bitflags! {
    /// Set of enabled branch kinds, one bit per [`BranchKind`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BranchKinds: u16 {
        /// `b`
        const B = 1 << 0;
        /// `bl`
        const BL = 1 << 1;
        /// `bc`
        const BC = 1 << 2;
        /// `bcl`
        const BCL = 1 << 3;
        /// `blr`
        const BLR = 1 << 4;
        /// `blrl`
        const BLRL = 1 << 5;
        /// `bclr`
        const BCLR = 1 << 6;
        /// `bclrl`
        const BCLRL = 1 << 7;
        /// `bctr`
        const BCTR = 1 << 8;
        /// `bctrl`
        const BCTRL = 1 << 9;
        /// `bcctr`
        const BCCTR = 1 << 10;
        /// `bcctrl`
        const BCCTRL = 1 << 11;
    }
}

impl From<BranchKind> for BranchKinds {
    fn from(kind: BranchKind) -> Self {
        match kind {
            BranchKind::B => BranchKinds::B,
            BranchKind::Bl => BranchKinds::BL,
            BranchKind::Bc => BranchKinds::BC,
            BranchKind::Bcl => BranchKinds::BCL,
            BranchKind::Blr => BranchKinds::BLR,
            BranchKind::Blrl => BranchKinds::BLRL,
            BranchKind::Bclr => BranchKinds::BCLR,
            BranchKind::Bclrl => BranchKinds::BCLRL,
            BranchKind::Bctr => BranchKinds::BCTR,
            BranchKind::Bctrl => BranchKinds::BCTRL,
            BranchKind::Bcctr => BranchKinds::BCCTR,
            BranchKind::Bcctrl => BranchKinds::BCCTRL,
        }
    }
}

impl Default for BranchKinds {
    fn default() -> Self {
        BranchKinds::all()
    }
}

/// One of the four inclusive address bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum AddressBound {
    /// Lowest accepted origin address
    #[strum(serialize = "Origin Min")]
    OriginMin,
    /// Highest accepted origin address
    #[strum(serialize = "Origin Max")]
    OriginMax,
    /// Lowest accepted destination address
    #[strum(serialize = "Destination Min")]
    DestinationMin,
    /// Highest accepted destination address
    #[strum(serialize = "Destination Max")]
    DestinationMax,
}

/// Which symbol column a pattern or action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SymbolField {
    /// Symbol containing the origin address
    #[strum(serialize = "Origin Symbol")]
    Origin,
    /// Symbol containing the destination address
    #[strum(serialize = "Destination Symbol")]
    Destination,
}

/// A case-insensitive substring pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct SymbolPattern {
    text: String,
    folded: String,
}

impl SymbolPattern {
    fn new(text: &str) -> Self {
        SymbolPattern {
            text: text.to_owned(),
            folded: text.to_lowercase(),
        }
    }

    /// An empty pattern accepts everything, otherwise the name must exist and contain it.
    fn accepts(&self, name: Option<&str>) -> bool {
        if self.folded.is_empty() {
            return true;
        }
        name.is_some_and(|name| name.to_lowercase().contains(&self.folded))
    }
}

/// Parse an address bound typed by the user.
///
/// Accepts hexadecimal digits with optional surrounding whitespace and an optional
/// `0x`/`0X` prefix.
///
/// # Errors
/// Returns [`Error::InvalidAddressText`] for empty text, non-hex digits or values that do
/// not fit into 32 bits.
pub fn parse_address(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidAddressText(text.to_owned()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidAddressText(text.to_owned()))
}

/// The user's query over the candidates.
///
/// The default configuration matches every recognized branch. The configuration is a
/// plain value: clone it to snapshot the current query and hand it back to
/// [`crate::filter::FilterEngine::restore`] to return to it.
///
/// # Examples
///
/// ```rust
/// use branchwatch::filter::{AddressBound, FilterConfig};
/// use branchwatch::watch::{CandidateKey, CandidateRecord};
///
/// // bl at 0x80001234
/// let record = CandidateRecord::new(CandidateKey::new(0x8000_1234, 0x8000_4000, 0x4800_2dcd), true);
/// let mut config = FilterConfig::default();
/// assert!(config.matches(&record));
///
/// config.set_address_bound(AddressBound::OriginMin, "80002000");
/// assert!(!config.matches(&record));
///
/// config.set_address_bound(AddressBound::OriginMin, "");
/// assert!(config.matches(&record));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    branch_kinds: BranchKinds,
    cond_true: bool,
    cond_false: bool,
    origin_min: Option<u32>,
    origin_max: Option<u32>,
    destination_min: Option<u32>,
    destination_max: Option<u32>,
    origin_symbol: SymbolPattern,
    destination_symbol: SymbolPattern,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            branch_kinds: BranchKinds::all(),
            cond_true: true,
            cond_false: true,
            origin_min: None,
            origin_max: None,
            destination_min: None,
            destination_max: None,
            origin_symbol: SymbolPattern::default(),
            destination_symbol: SymbolPattern::default(),
        }
    }
}

impl FilterConfig {
    /// Decide whether `record` is part of the filtered view.
    ///
    /// Checks, in order: condition, branch kind, address bounds, symbol patterns. A record
    /// whose instruction is not a recognized branch never matches.
    #[must_use]
    pub fn matches(&self, record: &CandidateRecord) -> bool {
        let condition_enabled = if record.condition_taken {
            self.cond_true
        } else {
            self.cond_false
        };
        if !condition_enabled {
            return false;
        }

        match record.branch_kind() {
            Some(kind) if self.branch_kinds.contains(kind.into()) => {}
            _ => return false,
        }

        let key = &record.key;
        if self.origin_min.is_some_and(|min| key.origin_address < min)
            || self.origin_max.is_some_and(|max| key.origin_address > max)
            || self.destination_min.is_some_and(|min| key.destination_address < min)
            || self.destination_max.is_some_and(|max| key.destination_address > max)
        {
            return false;
        }

        self.origin_symbol.accepts(record.origin_symbol.as_deref())
            && self
                .destination_symbol
                .accepts(record.destination_symbol.as_deref())
    }

    /// Whether rows of this branch kind are shown.
    #[must_use]
    pub fn branch_kind_enabled(&self, kind: BranchKind) -> bool {
        self.branch_kinds.contains(kind.into())
    }

    /// The full set of enabled branch kinds.
    #[must_use]
    pub fn branch_kinds(&self) -> BranchKinds {
        self.branch_kinds
    }

    /// Show or hide one branch kind.
    pub fn set_branch_kind(&mut self, kind: BranchKind, enabled: bool) {
        self.branch_kinds.set(kind.into(), enabled);
    }

    /// Replace the whole set of enabled branch kinds.
    pub fn set_branch_kinds(&mut self, kinds: BranchKinds) {
        self.branch_kinds = kinds;
    }

    /// Whether rows whose last condition evaluated to `condition` are shown.
    #[must_use]
    pub fn condition_enabled(&self, condition: bool) -> bool {
        if condition {
            self.cond_true
        } else {
            self.cond_false
        }
    }

    /// Show or hide rows whose last condition evaluated to `condition`.
    ///
    /// Unconditional branches count as `true`.
    pub fn set_condition(&mut self, condition: bool, enabled: bool) {
        if condition {
            self.cond_true = enabled;
        } else {
            self.cond_false = enabled;
        }
    }

    /// The current value of an address bound.
    #[must_use]
    pub fn address_bound(&self, bound: AddressBound) -> Option<u32> {
        match bound {
            AddressBound::OriginMin => self.origin_min,
            AddressBound::OriginMax => self.origin_max,
            AddressBound::DestinationMin => self.destination_min,
            AddressBound::DestinationMax => self.destination_max,
        }
    }

    /// Set an address bound from user text. Text that does not parse unsets the bound.
    pub fn set_address_bound(&mut self, bound: AddressBound, text: &str) {
        self.set_address_bound_value(bound, parse_address(text).ok());
    }

    /// Set or unset an address bound.
    pub fn set_address_bound_value(&mut self, bound: AddressBound, value: Option<u32>) {
        let slot = match bound {
            AddressBound::OriginMin => &mut self.origin_min,
            AddressBound::OriginMax => &mut self.origin_max,
            AddressBound::DestinationMin => &mut self.destination_min,
            AddressBound::DestinationMax => &mut self.destination_max,
        };
        *slot = value;
    }

    /// The symbol pattern as typed by the user.
    #[must_use]
    pub fn symbol_pattern(&self, field: SymbolField) -> &str {
        match field {
            SymbolField::Origin => &self.origin_symbol.text,
            SymbolField::Destination => &self.destination_symbol.text,
        }
    }

    /// Set a case-insensitive symbol substring pattern. Empty text disables it.
    pub fn set_symbol_pattern(&mut self, field: SymbolField, text: &str) {
        let pattern = SymbolPattern::new(text);
        match field {
            SymbolField::Origin => self.origin_symbol = pattern,
            SymbolField::Destination => self.destination_symbol = pattern,
        }
    }

    /// `true` if this configuration accepts every recognized branch.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == FilterConfig::default()
    }
}
