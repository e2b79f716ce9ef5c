use regex::Regex;

/// Which register names are allowed or not
pub enum ItemFilter {
    List {
        // If set, only the specified names are allowed. If not set, all names are allowed except
        // the ones listed in `block_list`.
        allow_list: Option<Vec<String>>,
        // These names are always blocked even if present in `allow_list`
        block_list: Vec<String>,
    },
    Regex {
        // If set, only names matching the regex are allowed
        allow: Option<Regex>,
        // If set, names matching the regex are not allowed
        block: Option<Regex>,
    },
}

impl ItemFilter {
    /// Allow every name
    pub const fn all() -> Self {
        Self::Regex {
            allow: None,
            block: None,
        }
    }

    pub fn list(allow_list: Option<Vec<String>>, block_list: Vec<String>) -> Self {
        Self::List {
            allow_list,
            block_list,
        }
    }

    pub const fn regex(allow: Option<Regex>, block: Option<Regex>) -> Self {
        Self::Regex { allow, block }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        match self {
            Self::List {
                allow_list,
                block_list,
            } => {
                if block_list.iter().any(|b| b == name) {
                    return false;
                }
                allow_list
                    .as_ref()
                    .map_or(true, |list| list.iter().any(|a| a == name))
            }
            Self::Regex { allow, block } => {
                if block.as_ref().is_some_and(|block| block.is_match(name)) {
                    return false;
                }
                allow.as_ref().map_or(true, |allow| allow.is_match(name))
            }
        }
    }
}

#[test]
fn list_filter_blocks_before_allowing() {
    let filter = ItemFilter::list(
        Some(vec!["SYSRANGE__START".into(), "SYSALS__START".into()]),
        vec!["SYSALS__START".into()],
    );
    assert!(filter.is_allowed("SYSRANGE__START"));
    assert!(!filter.is_allowed("SYSALS__START"));
    assert!(!filter.is_allowed("IDENTIFICATION__MODEL_ID"));
}

#[test]
fn regex_filter_works() {
    let filter = ItemFilter::regex(
        Some(Regex::new("^SYSRANGE__").unwrap()),
        Some(Regex::new("VHV").unwrap()),
    );
    assert!(filter.is_allowed("SYSRANGE__THRESH_HIGH"));
    assert!(!filter.is_allowed("SYSRANGE__VHV_RECALIBRATE"));
    assert!(!filter.is_allowed("SYSALS__START"));
    assert!(ItemFilter::all().is_allowed("anything"));
}
