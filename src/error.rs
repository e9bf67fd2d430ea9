use thiserror::Error;

// Gesture pipeline errors

#[derive(Error, Debug)]
pub enum GestureError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("video source not ready after {0} attempts")]
    VideoNotReady(u32),
}

// Quiz session errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuizError {
    #[error("answer index {index} out of range ({options} options)")]
    InvalidAnswerIndex { index: usize, options: usize },
    #[error("no answer selected for the current question")]
    NoAnswerSelected,
    #[error("quiz session already completed")]
    SessionCompleted,
    #[error("quiz session not completed yet")]
    NotCompleted,
    #[error("already at the first question")]
    AtFirstQuestion,
    #[error("no active quiz session")]
    NoSession,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StudentError {
    #[error("student name must not be empty")]
    EmptyName,
    #[error("student id '{0}' must be two letters followed by six digits")]
    BadStudentId(String),
}
