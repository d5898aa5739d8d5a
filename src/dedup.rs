use std::collections::{HashMap, HashSet};

use crate::models::QuestionRecord;
use crate::normalize::normalize_text;

/// Records sharing one normalized key, in discovery order. The first-seen
/// record is the keeper; everything after it is redundant.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub key: String,
    pub records: Vec<QuestionRecord>,
}

impl DuplicateGroup {
    pub fn keeper(&self) -> &QuestionRecord {
        &self.records[0]
    }

    pub fn redundant(&self) -> &[QuestionRecord] {
        &self.records[1..]
    }
}

/// Groups records by normalized question text in a single pass. Only keys
/// seen at least twice produce a group; groups come back in the order their
/// key was first encountered.
pub fn find_duplicate_groups(records: &[QuestionRecord]) -> Vec<DuplicateGroup> {
    let mut buckets: HashMap<String, Vec<QuestionRecord>> = HashMap::new();
    let mut key_order: Vec<String> = Vec::new();

    for record in records {
        let key = normalize_text(&record.question);
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            key_order.push(key);
            Vec::new()
        });
        bucket.push(record.clone());
    }

    key_order
        .into_iter()
        .filter_map(|key| {
            let records = buckets.remove(&key)?;
            (records.len() >= 2).then_some(DuplicateGroup { key, records })
        })
        .collect()
}

/// Drops later occurrences of an already-seen normalized question text,
/// preserving order. Used at read time so two near-duplicate variants never
/// land in the same session.
pub fn dedup_by_text(records: Vec<QuestionRecord>) -> Vec<QuestionRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(normalize_text(&r.question)))
        .collect()
}

/// Growing set of normalized keys seen so far, preloaded once per import run
/// from the live corpus and updated synchronously as rows are accepted, so
/// duplicates inside the same batch are caught too.
#[derive(Debug, Default)]
pub struct SeenKeys {
    keys: HashSet<String>,
}

impl SeenKeys {
    pub fn from_questions<'a>(questions: impl IntoIterator<Item = &'a str>) -> Self {
        let mut seen = Self::default();
        for text in questions {
            seen.insert(text);
        }
        seen
    }

    /// Registers the normalized key of `text`.
    pub fn insert(&mut self, text: &str) {
        self.keys.insert(normalize_text(text));
    }

    pub fn contains(&self, text: &str) -> bool {
        self.keys.contains(&normalize_text(text))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(question: &str) -> QuestionRecord {
        QuestionRecord {
            id: Uuid::new_v4(),
            theme: "institutions".to_string(),
            level: "moyen".to_string(),
            exam_type: "naturalisation".to_string(),
            question: question.to_string(),
            choices: vec!["Oui".to_string(), "Non".to_string()],
            correct_index: 0,
            explanation: None,
            tags: vec![],
            is_active: true,
            source: None,
            reference: None,
            original_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_seen_wins() {
        let a = record("Quel est le drapeau français ?");
        let b = record("Qui vote les lois ?");
        let c = record("Qui vote les lois ? (Variante 2)");

        let groups = find_duplicate_groups(&[a, b.clone(), c.clone()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keeper().id, b.id);
        assert_eq!(groups[0].redundant().len(), 1);
        assert_eq!(groups[0].redundant()[0].id, c.id);
    }

    #[test]
    fn test_no_groups_without_duplicates() {
        let records = vec![record("Question une ?"), record("Question deux ?")];
        assert!(find_duplicate_groups(&records).is_empty());
    }

    #[test]
    fn test_group_order_follows_discovery() {
        let records = vec![
            record("A ?"),
            record("B ?"),
            record("a ?"),
            record("b ?"),
        ];
        let groups = find_duplicate_groups(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "a");
        assert_eq!(groups[1].key, "b");
    }

    #[test]
    fn test_dedup_by_text_keeps_first() {
        let a = record("Qui vote les lois ?");
        let b = record("qui vote les lois (variante 3)");
        let c = record("Autre question ?");
        let out = dedup_by_text(vec![a.clone(), b, c.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, a.id);
        assert_eq!(out[1].id, c.id);
    }

    #[test]
    fn test_seen_keys_fold_variants() {
        let mut seen = SeenKeys::from_questions(["Qui vote les lois ?"]);
        assert!(seen.contains("QUI VOTE LES LOIS"));
        assert!(seen.contains("Qui vote les lois ? (Variante 2)"));
        assert!(!seen.contains("Qui élit le Président ?"));
        seen.insert("Qui élit le Président ?");
        assert!(seen.contains("qui elit le president"));
        assert_eq!(seen.len(), 2);
    }
}
