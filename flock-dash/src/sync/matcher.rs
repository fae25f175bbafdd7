//! Member matching for imported rows
//!
//! Phone equality wins outright. Otherwise names are compared with
//! Jaro-Winkler similarity on a normalised form, and a candidate is only
//! accepted when both phones are absent or equal.

use strsim::jaro_winkler;

use crate::db::members::MemberIdentity;

/// Minimum Jaro-Winkler similarity for two names to be the same person
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.92;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Found(String),
    NotFound,
    /// More than one member is an equally plausible match
    Ambiguous(Vec<String>),
}

/// Lowercase, strip punctuation and collapse whitespace
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    name: String,
    phone: Option<String>,
}

/// In-memory view of existing members for one sync run
///
/// Rows inserted during the run are pushed so later rows can match them.
#[derive(Debug, Default)]
pub struct MemberIndex {
    entries: Vec<Entry>,
}

impl MemberIndex {
    pub fn new(identities: Vec<MemberIdentity>) -> Self {
        let mut index = Self::default();
        for identity in identities {
            index.push(identity);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, identity: MemberIdentity) {
        self.entries.push(Entry {
            name: normalize_name(&format!("{} {}", identity.first_name, identity.last_name)),
            id: identity.id,
            phone: identity.phone,
        });
    }

    /// Find the member a row refers to
    ///
    /// `phone` must already be normalised.
    pub fn find(&self, full_name: Option<&str>, phone: Option<&str>) -> MatchOutcome {
        if let Some(phone) = phone {
            if let Some(entry) = self.entries.iter().find(|e| e.phone.as_deref() == Some(phone)) {
                return MatchOutcome::Found(entry.id.clone());
            }
        }

        let Some(name) = full_name.map(normalize_name).filter(|n| !n.is_empty()) else {
            return MatchOutcome::NotFound;
        };

        let candidates: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| match (phone, e.phone.as_deref()) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            })
            .filter(|e| jaro_winkler(&name, &e.name) >= NAME_SIMILARITY_THRESHOLD)
            .collect();

        match candidates.as_slice() {
            [] => MatchOutcome::NotFound,
            [only] => MatchOutcome::Found(only.id.clone()),
            many => {
                // An exact name match among near-matches is not ambiguous
                let exact: Vec<&&Entry> = many.iter().filter(|e| e.name == name).collect();
                if let [only] = exact.as_slice() {
                    MatchOutcome::Found(only.id.clone())
                } else {
                    MatchOutcome::Ambiguous(many.iter().map(|e| e.id.clone()).collect())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str, first: &str, last: &str, phone: Option<&str>) -> MemberIdentity {
        MemberIdentity {
            id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: phone.map(str::to_string),
        }
    }

    fn index() -> MemberIndex {
        MemberIndex::new(vec![
            identity("1", "Ama", "Mensah", Some("233241234567")),
            identity("2", "Kwame", "Asante", None),
            identity("3", "Abena", "Owusu", Some("233201112223")),
        ])
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Ama   MENSAH-Boateng "), "ama mensah boateng");
        assert_eq!(normalize_name("O'Neil"), "o neil");
    }

    #[test]
    fn test_phone_match_wins_over_name() {
        let idx = index();
        assert_eq!(idx.find(Some("Somebody Else"), Some("233241234567")), MatchOutcome::Found("1".into()));
    }

    #[test]
    fn test_similar_name_without_phones() {
        let idx = index();
        assert_eq!(idx.find(Some("Kwame Asantey"), None), MatchOutcome::Found("2".into()));
        assert_eq!(idx.find(Some("kwame  asante"), None), MatchOutcome::Found("2".into()));
    }

    #[test]
    fn test_conflicting_phones_block_name_match() {
        let idx = index();
        // Same name, different phone: a different person
        assert_eq!(idx.find(Some("Ama Mensah"), Some("233559998887")), MatchOutcome::NotFound);
    }

    #[test]
    fn test_one_sided_phone_blocks_name_match() {
        let idx = index();
        // Row has a phone, member has none
        assert_eq!(idx.find(Some("Kwame Asante"), Some("233559998887")), MatchOutcome::NotFound);
        // Member has a phone, row has none
        assert_eq!(idx.find(Some("Ama Mensah"), None), MatchOutcome::NotFound);
    }

    #[test]
    fn test_dissimilar_name_not_found() {
        let idx = index();
        assert_eq!(idx.find(Some("Yaw Darko"), None), MatchOutcome::NotFound);
        assert_eq!(idx.find(None, None), MatchOutcome::NotFound);
    }

    #[test]
    fn test_ambiguous_name() {
        let idx = MemberIndex::new(vec![
            identity("a", "John", "Mensah", None),
            identity("b", "John", "Mensah", None),
        ]);
        assert_eq!(
            idx.find(Some("John Mensah"), None),
            MatchOutcome::Ambiguous(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_exact_name_breaks_near_tie() {
        let idx = MemberIndex::new(vec![
            identity("a", "John", "Mensah", None),
            identity("b", "Jon", "Mensah", None),
        ]);
        assert_eq!(idx.find(Some("John Mensah"), None), MatchOutcome::Found("a".into()));
    }

    #[test]
    fn test_pushed_rows_are_matchable() {
        let mut idx = MemberIndex::default();
        assert!(idx.is_empty());
        idx.push(identity("n", "Esi", "Quaye", Some("233271234567")));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.find(None, Some("233271234567")), MatchOutcome::Found("n".into()));
    }
}
