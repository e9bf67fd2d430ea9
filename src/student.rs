//! Student registration data.

use serde::{Deserialize, Serialize};

use crate::error::StudentError;

/// A registered quiz taker. Construction validates and normalizes; an
/// instance always holds a non-empty name and an uppercased, well-formed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    pub student_id: String,
}

impl Student {
    /// Student ids are two ASCII letters followed by six digits (SE123456).
    pub fn new(name: &str, student_id: &str) -> Result<Self, StudentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudentError::EmptyName);
        }
        let id = student_id.trim();
        if !valid_student_id(id) {
            return Err(StudentError::BadStudentId(id.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            student_id: id.to_ascii_uppercase(),
        })
    }
}

fn valid_student_id(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 8
        && b[..2].iter().all(|c| c.is_ascii_alphabetic())
        && b[2..].iter().all(|c| c.is_ascii_digit())
}
