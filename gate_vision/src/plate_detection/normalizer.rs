use std::fmt;

/// Canonical plate text: uppercase ASCII letters and digits, plus hyphens
/// when the normalizer keeps them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NormalizedPlate {
    token: String,
}

impl NormalizedPlate {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn len(&self) -> usize {
        self.token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

impl fmt::Display for NormalizedPlate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlateNormalizer {
    keep_hyphens: bool,
}

impl PlateNormalizer {
    pub fn new(keep_hyphens: bool) -> Self {
        Self { keep_hyphens }
    }

    pub fn normalize(&self, raw_text: &str) -> NormalizedPlate {
        let token = raw_text
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || (self.keep_hyphens && *c == '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        NormalizedPlate { token }
    }
}
