//! Quiz session state: navigation, answer recording, completion and scoring.
//!
//! The session is the consumer of gesture intents but knows nothing about
//! gestures. All clock values come in as milliseconds from the caller so the
//! whole state machine is testable without real time.

use serde::Serialize;

use crate::error::QuizError;
use crate::questions::QuizQuestion;
use crate::student::Student;

#[derive(Debug)]
pub struct QuizSession {
    student: Student,
    questions: Vec<QuizQuestion>,
    current: usize,
    selected: Option<usize>,
    answers: Vec<Option<usize>>,
    completed: bool,
    started_at_ms: u64,
    ended_at_ms: Option<u64>,
    recorded_attempt_id: Option<String>,
}

/// Final result of a completed session.
#[derive(Debug, Clone, Serialize)]
pub struct QuizOutcome {
    pub score_percent: u32,
    pub correct: usize,
    pub total: usize,
    pub time_taken_s: u64,
    /// Per-question selected option; -1 where no answer was recorded.
    pub answers: Vec<i64>,
    pub question_ids: Vec<u32>,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
}

impl QuizSession {
    pub fn new(student: Student, questions: Vec<QuizQuestion>, now_ms: u64) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoSession);
        }
        let answers = vec![None; questions.len()];
        Ok(Self {
            student,
            questions,
            current: 0,
            selected: None,
            answers,
            completed: false,
            started_at_ms: now_ms,
            ended_at_ms: None,
            recorded_attempt_id: None,
        })
    }

    pub fn student(&self) -> &Student {
        &self.student
    }

    pub fn current_question(&self) -> &QuizQuestion {
        &self.questions[self.current]
    }

    /// (current 0-based index, total questions)
    pub fn progress(&self) -> (usize, usize) {
        (self.current, self.questions.len())
    }

    pub fn has_selected_answer(&self) -> bool {
        self.selected.is_some()
    }

    pub fn selected_answer(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Correct answers among those recorded so far.
    pub fn correct_so_far(&self) -> usize {
        self.questions
            .iter()
            .zip(&self.answers)
            .filter(|(q, a)| **a == Some(q.correct_answer_index))
            .count()
    }

    /// Record an answer for the current question. Out-of-range indices are
    /// rejected without mutating the selection.
    pub fn select_answer(&mut self, index: usize) -> Result<(), QuizError> {
        if self.completed {
            return Err(QuizError::SessionCompleted);
        }
        let options = self.current_question().options.len();
        if index >= options {
            return Err(QuizError::InvalidAnswerIndex { index, options });
        }
        self.selected = Some(index);
        self.answers[self.current] = Some(index);
        Ok(())
    }

    /// Move to the next question, or complete the session on the last one.
    /// Requires an answer for the current question.
    pub fn advance(&mut self, now_ms: u64) -> Result<(), QuizError> {
        if self.completed {
            return Err(QuizError::SessionCompleted);
        }
        if self.selected.is_none() {
            return Err(QuizError::NoAnswerSelected);
        }
        if self.current == self.questions.len() - 1 {
            self.completed = true;
            self.ended_at_ms = Some(now_ms);
        } else {
            self.current += 1;
            self.selected = self.answers[self.current];
        }
        Ok(())
    }

    /// Step back one question, restoring its recorded answer.
    pub fn previous(&mut self) -> Result<(), QuizError> {
        if self.completed {
            return Err(QuizError::SessionCompleted);
        }
        if self.current == 0 {
            return Err(QuizError::AtFirstQuestion);
        }
        self.current -= 1;
        self.selected = self.answers[self.current];
        Ok(())
    }

    /// Score a completed session.
    pub fn outcome(&self) -> Result<QuizOutcome, QuizError> {
        if !self.completed {
            return Err(QuizError::NotCompleted);
        }
        let total = self.questions.len();
        let correct = self.correct_so_far();
        let score_percent = ((correct as f64 / total as f64) * 100.0).round() as u32;
        let completed_at_ms = self.ended_at_ms.unwrap_or(self.started_at_ms);
        Ok(QuizOutcome {
            score_percent,
            correct,
            total,
            time_taken_s: (completed_at_ms.saturating_sub(self.started_at_ms)) / 1000,
            answers: self
                .answers
                .iter()
                .map(|a| a.map(|i| i as i64).unwrap_or(-1))
                .collect(),
            question_ids: self.questions.iter().map(|q| q.id).collect(),
            started_at_ms: self.started_at_ms,
            completed_at_ms,
        })
    }

    /// Attempt id under which this session's outcome was persisted, if any.
    /// Guards against recording the same session twice.
    pub fn recorded_attempt_id(&self) -> Option<&str> {
        self.recorded_attempt_id.as_deref()
    }

    pub fn mark_recorded(&mut self, attempt_id: String) {
        self.recorded_attempt_id = Some(attempt_id);
    }
}
