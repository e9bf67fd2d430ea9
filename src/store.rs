//! On-disk results store: quiz attempts and the leaderboard, as JSON files
//! under the user data directory.
//!
//! Corrupt or missing files degrade to empty lists with a warning; results
//! recording must never take the quiz down.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::UserDirs;
use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::quiz::QuizOutcome;
use crate::student::Student;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: String,
    pub user_name: String,
    pub student_id: String,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
    pub score: u32,
    pub time_taken_s: u64,
    pub answers: Vec<i64>,
    pub is_completed: bool,
    pub question_ids: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub student_id: String,
    pub score: u32,
    pub time_taken_s: u64,
    pub date_ms: u64,
    pub attempt_id: String,
}

#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

fn default_data_dir() -> Result<PathBuf> {
    let user = UserDirs::new().context("no home directory")?;
    Ok(user
        .home_dir()
        .join(".local")
        .join("share")
        .join("quizctl"))
}

impl Store {
    pub fn open_default() -> Result<Self> {
        Self::open(default_data_dir()?)
    }

    pub fn open(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    fn attempts_path(&self) -> PathBuf {
        self.data_dir.join("attempts.json")
    }

    fn leaderboard_path(&self) -> PathBuf {
        self.data_dir.join("leaderboard.json")
    }

    /// Persist a finished attempt and its leaderboard entry. Returns the
    /// generated attempt id.
    pub fn record_outcome(&self, student: &Student, outcome: &QuizOutcome) -> Result<String> {
        let attempt_id = Uuid::new_v4().to_string();
        let attempt = QuizAttempt {
            id: attempt_id.clone(),
            user_name: student.name.clone(),
            student_id: student.student_id.clone(),
            started_at_ms: outcome.started_at_ms,
            completed_at_ms: outcome.completed_at_ms,
            score: outcome.score_percent,
            time_taken_s: outcome.time_taken_s,
            answers: outcome.answers.clone(),
            is_completed: true,
            question_ids: outcome.question_ids.clone(),
        };
        let mut attempts: Vec<QuizAttempt> = self.read_list(&self.attempts_path());
        attempts.push(attempt);
        self.write_list(&self.attempts_path(), &attempts)?;

        let entry = LeaderboardEntry {
            id: Uuid::new_v4().to_string(),
            name: student.name.clone(),
            student_id: student.student_id.clone(),
            score: outcome.score_percent,
            time_taken_s: outcome.time_taken_s,
            date_ms: outcome.completed_at_ms,
            attempt_id: attempt_id.clone(),
        };
        let mut board: Vec<LeaderboardEntry> = self.read_list(&self.leaderboard_path());
        board.push(entry);
        self.write_list(&self.leaderboard_path(), &board)?;

        Ok(attempt_id)
    }

    /// Best scores first; ties broken by the shorter time.
    pub fn top_scores(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut board: Vec<LeaderboardEntry> = self.read_list(&self.leaderboard_path());
        board.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.time_taken_s.cmp(&b.time_taken_s))
        });
        board.truncate(limit);
        board
    }

    /// One student's entries, most recent first.
    pub fn student_scores(&self, student_id: &str) -> Vec<LeaderboardEntry> {
        let wanted = student_id.to_ascii_uppercase();
        let mut board: Vec<LeaderboardEntry> = self.read_list(&self.leaderboard_path());
        board.retain(|e| e.student_id == wanted);
        board.sort_by(|a, b| b.date_ms.cmp(&a.date_ms));
        board
    }

    fn read_list<T: DeserializeOwned>(&self, path: &Path) -> Vec<T> {
        let txt = match fs::read_to_string(path) {
            Ok(txt) => txt,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&txt) {
            Ok(list) => list,
            Err(e) => {
                warn!("ignoring corrupt {}: {e}", path.display());
                Vec::new()
            }
        }
    }

    fn write_list<T: Serialize>(&self, path: &Path, list: &[T]) -> Result<()> {
        let txt = serde_json::to_string_pretty(list)?;
        fs::write(path, txt).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> Store {
        let dir = std::env::temp_dir()
            .join("quizctl-test")
            .join(Uuid::new_v4().to_string());
        Store::open(dir).unwrap()
    }

    fn outcome(score: u32, time_s: u64, date_ms: u64) -> QuizOutcome {
        QuizOutcome {
            score_percent: score,
            correct: 0,
            total: 20,
            time_taken_s: time_s,
            answers: vec![0, -1],
            question_ids: vec![1, 2],
            started_at_ms: date_ms.saturating_sub(time_s * 1000),
            completed_at_ms: date_ms,
        }
    }

    #[test]
    fn top_scores_orders_by_score_then_time() {
        let store = scratch_store();
        let a = Student::new("A", "SE000001").unwrap();
        let b = Student::new("B", "SE000002").unwrap();
        let c = Student::new("C", "SE000003").unwrap();
        store.record_outcome(&a, &outcome(80, 120, 1)).unwrap();
        store.record_outcome(&b, &outcome(95, 300, 2)).unwrap();
        store.record_outcome(&c, &outcome(95, 90, 3)).unwrap();

        let top = store.top_scores(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].student_id, "SE000003");
        assert_eq!(top[1].student_id, "SE000002");
    }

    #[test]
    fn student_scores_are_most_recent_first() {
        let store = scratch_store();
        let s = Student::new("A", "se000009").unwrap();
        let other = Student::new("B", "SE000010").unwrap();
        store.record_outcome(&s, &outcome(50, 100, 1_000)).unwrap();
        store.record_outcome(&other, &outcome(99, 10, 1_500)).unwrap();
        store.record_outcome(&s, &outcome(70, 100, 2_000)).unwrap();

        let mine = store.student_scores("SE000009");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].score, 70);
        assert_eq!(mine[1].score, 50);
    }

    #[test]
    fn attempt_and_entry_share_the_attempt_id() {
        let store = scratch_store();
        let s = Student::new("A", "SE000011").unwrap();
        let id = store.record_outcome(&s, &outcome(60, 45, 9_000)).unwrap();
        let board = store.top_scores(10);
        assert_eq!(board[0].attempt_id, id);
    }

    #[test]
    fn corrupt_leaderboard_degrades_to_empty() {
        let store = scratch_store();
        fs::write(store.leaderboard_path(), "{not json").unwrap();
        assert!(store.top_scores(10).is_empty());
        // and recording over it still works
        let s = Student::new("A", "SE000012").unwrap();
        store.record_outcome(&s, &outcome(10, 5, 100)).unwrap();
        assert_eq!(store.top_scores(10).len(), 1);
    }
}
