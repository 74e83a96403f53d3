use super::normalizer::{NormalizedPlate, PlateNormalizer};

/// Authorized plates, normalized once at load time, in configured order.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationList {
    entries: Vec<AuthorizedPlate>,
}

#[derive(Clone, Debug)]
struct AuthorizedPlate {
    original: String,
    token: NormalizedPlate,
}

impl AuthorizationList {
    pub fn new<I, S>(plates: I, normalizer: &PlateNormalizer) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<AuthorizedPlate> = Vec::new();
        for plate in plates {
            let original = plate.into();
            let token = normalizer.normalize(&original);
            if token.is_empty() || entries.iter().any(|e| e.token == token) {
                continue;
            }
            entries.push(AuthorizedPlate { original, token });
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, token: &NormalizedPlate) -> bool {
        self.entries.iter().any(|e| &e.token == token)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchDecision {
    pub matched: bool,
    pub authorized_plate: Option<String>,
    pub similarity: f32,
}

impl MatchDecision {
    fn rejected(similarity: f32) -> Self {
        Self {
            matched: false,
            authorized_plate: None,
            similarity,
        }
    }
}

/// Substring containment in either direction, bounded by a length ratio.
#[derive(Clone, Debug)]
pub struct AuthorizationMatcher {
    list: AuthorizationList,
    min_length: usize,
    similarity_threshold: f32,
}

impl AuthorizationMatcher {
    pub fn new(list: AuthorizationList, min_length: usize, similarity_threshold: f32) -> Self {
        Self {
            list,
            min_length,
            similarity_threshold,
        }
    }

    pub fn list(&self) -> &AuthorizationList {
        &self.list
    }

    /// First qualifying entry in list order.
    pub fn match_token(&self, token: &NormalizedPlate) -> MatchDecision {
        self.scan(token, false)
    }

    /// Highest-similarity qualifying entry; ties go to the earlier entry.
    pub fn best_match(&self, token: &NormalizedPlate) -> MatchDecision {
        self.scan(token, true)
    }

    fn scan(&self, token: &NormalizedPlate, whole_list: bool) -> MatchDecision {
        if token.len() < self.min_length {
            return MatchDecision::rejected(0.0);
        }

        let mut best: Option<(&AuthorizedPlate, f32)> = None;
        let mut closest = 0.0f32;
        for entry in &self.list.entries {
            let candidate = token.as_str();
            let authorized = entry.token.as_str();
            if !(authorized.contains(candidate) || candidate.contains(authorized)) {
                continue;
            }
            let similarity = length_ratio(candidate, authorized);
            closest = closest.max(similarity);
            if similarity <= self.similarity_threshold {
                continue;
            }
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((entry, similarity));
            }
            if !whole_list {
                break;
            }
        }

        match best {
            Some((entry, similarity)) => MatchDecision {
                matched: true,
                authorized_plate: Some(entry.original.clone()),
                similarity,
            },
            None => MatchDecision::rejected(closest),
        }
    }
}

fn length_ratio(a: &str, b: &str) -> f32 {
    let (a, b) = (a.len(), b.len());
    let longest = a.max(b);
    if longest == 0 {
        return 0.0;
    }
    a.min(b) as f32 / longest as f32
}
