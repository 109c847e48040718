//! Question bank
//!
//! Loaded once at startup from `question,answer` CSV records and shared
//! read-only by every room.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::types::clean_text;

use super::question::Question;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Failed to open question file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse question file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Record {record} has {fields} fields, expected 2")]
    Malformed { record: usize, fields: usize },

    #[error("Question file contains no records")]
    Empty,
}

#[derive(Debug, Clone)]
struct Record {
    question: String,
    answer: String,
}

#[derive(Debug, Clone)]
pub struct QuestionRepo {
    records: Vec<Record>,
    /// Distinct normalized seed answers across all records
    answers: Vec<String>,
}

impl QuestionRepo {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RepoError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        let mut answer_set = BTreeSet::new();
        for (i, row) in csv.records().enumerate() {
            let row = row?;
            if row.len() != 2 {
                return Err(RepoError::Malformed {
                    record: i + 1,
                    fields: row.len(),
                });
            }
            let record = Record {
                question: row[0].to_string(),
                answer: clean_text(&row[1]),
            };
            answer_set.insert(record.answer.clone());
            records.push(record);
        }

        if records.is_empty() {
            return Err(RepoError::Empty);
        }

        tracing::info!(
            "Loaded {} questions ({} distinct answers)",
            records.len(),
            answer_set.len()
        );

        Ok(Self {
            records,
            answers: answer_set.into_iter().collect(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Up to `n` distinct questions in random order, each freshly built with
    /// its seed answer marked correct.
    pub fn questions(&self, n: usize) -> Vec<Question> {
        self.questions_with(&mut rand::rng(), n)
    }

    pub fn questions_with<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<Question> {
        self.records
            .choose_multiple(rng, n)
            .map(|r| Question::new(r.question.clone(), r.answer.clone()))
            .collect()
    }

    /// Up to `n` distinct decoy answer texts drawn from all seed answers.
    pub fn answers(&self, n: usize) -> Vec<String> {
        self.answers_with(&mut rand::rng(), n)
    }

    pub fn answers_with<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<String> {
        self.answers.choose_multiple(rng, n).cloned().collect()
    }
}
