use anyhow::Result;
use log::{error, info};
use notify::{RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use super::dispatch::{self, SharedSession};
use super::pipeline::{PipelineShared, run_pipeline};
use super::runtime::{epoch_ms, socket_path};
use crate::config::DaemonConfigState;
use crate::debounce::Intent;
use crate::error::QuizError;
use crate::gestures::GestureLabel;
use crate::questions;
use crate::quiz::QuizSession;
use crate::store::Store;
use crate::student::Student;

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let store = Store::open_default()?;

    // gesture pipeline thread
    let shared = PipelineShared::new(cfg.profile.clone());
    let (tx_inject, rx_inject) = mpsc::channel::<GestureLabel>();
    let stop = Arc::new(AtomicBool::new(false));
    let pipeline = {
        let shared = shared.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            if let Err(e) = run_pipeline(shared, rx_inject, stop) {
                error!("gesture pipeline failed: {e}");
            }
        })
    };

    let mut state = DaemonState {
        cfg,
        store,
        shared,
        inject: tx_inject,
    };

    // SIGINT/SIGTERM request the same orderly teardown as the shutdown op
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            if signals.forever().next().is_some() {
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    // hot-reload the active profile when anything in profiles/ changes
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let watcher_tx = tx_req.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if event.kind.is_modify() || event.kind.is_create() {
                let _ = watcher_tx.send(IpcMsg::Reload);
            }
        }
    })?;
    watcher.watch(&state.cfg.profiles_dir, RecursiveMode::NonRecursive)?;

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let snapshot = state.clone_shallow();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, snapshot, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => match state.cfg.reload() {
                    Ok(()) => {
                        state.push_profile();
                        info!("profile reloaded");
                    }
                    Err(e) => error!("reload failed, keeping last good profile: {e}"),
                },
                IpcMsg::UseProfile(name) => match state.cfg.set_active(&name) {
                    Ok(()) => {
                        state.push_profile();
                        info!("switched active profile to {}", state.cfg.active_name);
                    }
                    Err(e) => error!("use profile failed: {e}"),
                },
                IpcMsg::Shutdown => {
                    shutdown.store(true, Ordering::SeqCst);
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    // teardown order: sampling loop (inside the pipeline), classifier,
    // video source; then the socket
    info!("daemon: shutting down");
    stop.store(true, Ordering::SeqCst);
    let _ = pipeline.join();
    let _ = std::fs::remove_file(&sock);
    Ok(())
}

fn handle_client(
    mut stream: UnixStream,
    mut st: DaemonState,
    tx_req: mpsc::Sender<IpcMsg>,
) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = handle_op(op, &req, &mut st, &tx_req);
    writeln!(stream, "{resp}")?;
    Ok(())
}

fn handle_op(
    op: &str,
    req: &serde_json::Value,
    st: &mut DaemonState,
    tx_req: &mpsc::Sender<IpcMsg>,
) -> serde_json::Value {
    match op {
        "status" => {
            let gesture = *st.shared.gesture.lock().unwrap();
            let gesture_text = if gesture == GestureLabel::Unknown {
                "No gesture detected".to_string()
            } else {
                format!("Detected: {}", gesture.as_str())
            };
            let phase = st.shared.phase.lock().unwrap().as_str();
            let session = st
                .shared
                .session
                .lock()
                .unwrap()
                .as_ref()
                .map(session_view);
            ok(serde_json::json!({
                "active_profile": st.cfg.active_name,
                "socket": socket_path(),
                "cameras": st.cfg.detected_cameras,
                "pipeline": phase,
                "gesture": gesture_text,
                "session": session,
            }))
        }
        "reload" => {
            let _ = tx_req.send(IpcMsg::Reload);
            ok(serde_json::json!({"active_profile": st.cfg.active_name}))
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            let _ = tx_req.send(IpcMsg::UseProfile(name.to_string()));
            ok(serde_json::json!({"active_profile": name}))
        }
        "list" => {
            let list = st.cfg.list_profiles();
            ok(serde_json::json!({"profiles": list, "active": st.cfg.active_name}))
        }
        "doctor" => ok(st.cfg.doctor_report()),
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            ok(serde_json::json!("shutting down"))
        }
        other => quiz_op(other, req, &st.shared.session, &st.store, &st.inject)
            .unwrap_or_else(|| err(format!("unknown op: {other}"))),
    }
}

/// Quiz session ops; `None` means the op name is not one of ours.
fn quiz_op(
    op: &str,
    req: &serde_json::Value,
    session: &SharedSession,
    store: &Store,
    inject: &mpsc::Sender<GestureLabel>,
) -> Option<serde_json::Value> {
    let resp = match op {
        "register" => {
            let name = req.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let id = req.get("student_id").and_then(|v| v.as_str()).unwrap_or("");
            match register(name, id) {
                Ok(new_session) => {
                    let view = session_view(&new_session);
                    *session.lock().unwrap() = Some(new_session);
                    ok(view)
                }
                Err(e) => err(e),
            }
        }
        "answer" => {
            let Some(index) = req.get("index").and_then(|v| v.as_u64()) else {
                return Some(err("answer requires a numeric 'index'"));
            };
            let intent = Intent::SelectOption(index as usize);
            match dispatch::apply_intent(intent, session, epoch_ms()) {
                Ok(msg) => with_session_view(session, msg),
                Err(e) => err(e),
            }
        }
        "advance" => match dispatch::apply_intent(Intent::Advance, session, epoch_ms()) {
            Ok(msg) => with_session_view(session, msg),
            Err(e) => err(e),
        },
        "previous" => {
            let mut guard = session.lock().unwrap();
            match guard.as_mut().ok_or(QuizError::NoSession).and_then(|s| s.previous()) {
                Ok(()) => {
                    let view = guard.as_ref().map(session_view);
                    ok(serde_json::json!({"message": "moved back", "session": view}))
                }
                Err(e) => err(e),
            }
        }
        "results" => {
            let mut guard = session.lock().unwrap();
            let Some(s) = guard.as_mut() else {
                return Some(err(QuizError::NoSession));
            };
            match s.outcome() {
                Ok(outcome) => {
                    let attempt_id = match s.recorded_attempt_id() {
                        Some(id) => Ok(id.to_string()),
                        None => store.record_outcome(s.student(), &outcome).map(|id| {
                            s.mark_recorded(id.clone());
                            id
                        }),
                    };
                    match attempt_id {
                        Ok(id) => ok(serde_json::json!({
                            "attempt_id": id,
                            "student": s.student(),
                            "outcome": outcome,
                        })),
                        Err(e) => err(format!("failed to save results: {e}")),
                    }
                }
                Err(e) => err(e),
            }
        }
        "leaderboard" => {
            let limit = req.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
            let entries = match req.get("student").and_then(|v| v.as_str()) {
                Some(id) => store.student_scores(id),
                None => store.top_scores(limit),
            };
            ok(serde_json::json!({"entries": entries}))
        }
        "gesture" => {
            let label = req.get("label").and_then(|v| v.as_str()).unwrap_or("");
            match GestureLabel::parse(label) {
                Ok(gesture) => match inject.send(gesture) {
                    Ok(()) => ok(serde_json::json!({"queued": gesture.as_str()})),
                    Err(_) => err("gesture pipeline is not running"),
                },
                Err(e) => err(e),
            }
        }
        _ => return None,
    };
    Some(resp)
}

fn register(name: &str, id: &str) -> Result<QuizSession> {
    let student = Student::new(name, id)?;
    let bank = questions::builtin_bank()?;
    Ok(QuizSession::new(student, bank, epoch_ms())?)
}

fn session_view(s: &QuizSession) -> serde_json::Value {
    let (i, n) = s.progress();
    let q = s.current_question();
    serde_json::json!({
        "student": s.student(),
        "question_number": i + 1,
        "total_questions": n,
        "question": q.question,
        "options": q.options,
        "selected": s.selected_answer(),
        "completed": s.is_completed(),
        "correct_so_far": s.correct_so_far(),
    })
}

fn with_session_view(session: &SharedSession, msg: String) -> serde_json::Value {
    let view = session.lock().unwrap().as_ref().map(session_view);
    ok(serde_json::json!({"message": msg, "session": view}))
}

fn ok(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"ok": true, "data": data})
}

fn err(e: impl ToString) -> serde_json::Value {
    serde_json::json!({"ok": false, "error": e.to_string()})
}

struct DaemonState {
    cfg: DaemonConfigState,
    store: Store,
    shared: PipelineShared,
    inject: mpsc::Sender<GestureLabel>,
}

impl DaemonState {
    fn clone_shallow(&self) -> Self {
        Self {
            cfg: self.cfg.clone(),
            store: self.store.clone(),
            shared: self.shared.clone(),
            inject: self.inject.clone(),
        }
    }

    /// Publish the (re)loaded profile to the pipeline thread.
    fn push_profile(&self) {
        *self.shared.profile.lock().unwrap() = self.cfg.profile.clone();
        self.shared.profile_dirty.store(true, Ordering::SeqCst);
    }
}

enum IpcMsg {
    Reload,
    UseProfile(String),
    Shutdown,
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path();
    if !sock.exists() {
        return Err(anyhow::anyhow!(
            "quizctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn fixture() -> (SharedSession, Store, mpsc::Sender<GestureLabel>) {
        let session: SharedSession = Arc::new(Mutex::new(None));
        let dir = std::env::temp_dir()
            .join("quizctl-test")
            .join(Uuid::new_v4().to_string());
        let store = Store::open(dir).unwrap();
        let (tx, _rx) = mpsc::channel();
        (session, store, tx)
    }

    fn call(
        op: &str,
        req: serde_json::Value,
        session: &SharedSession,
        store: &Store,
        inject: &mpsc::Sender<GestureLabel>,
    ) -> serde_json::Value {
        quiz_op(op, &req, session, store, inject).expect("known op")
    }

    #[test]
    fn register_answer_advance_results_flow() {
        let (session, store, inject) = fixture();

        let resp = call(
            "register",
            serde_json::json!({"name": "Ada Lovelace", "student_id": "se123456"}),
            &session,
            &store,
            &inject,
        );
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["data"]["total_questions"], 20);
        assert_eq!(resp["data"]["student"]["student_id"], "SE123456");

        // premature results
        let resp = call("results", serde_json::json!({}), &session, &store, &inject);
        assert_eq!(resp["ok"], false);

        // answer option 1 on every question and advance to completion
        for _ in 0..20 {
            let resp = call(
                "answer",
                serde_json::json!({"index": 1}),
                &session,
                &store,
                &inject,
            );
            assert_eq!(resp["ok"], true, "{resp}");
            let resp = call("advance", serde_json::json!({}), &session, &store, &inject);
            assert_eq!(resp["ok"], true, "{resp}");
        }

        let resp = call("results", serde_json::json!({}), &session, &store, &inject);
        assert_eq!(resp["ok"], true, "{resp}");
        let attempt_id = resp["data"]["attempt_id"].as_str().unwrap().to_string();

        // results are idempotent: same attempt id, single leaderboard entry
        let resp = call("results", serde_json::json!({}), &session, &store, &inject);
        assert_eq!(resp["data"]["attempt_id"].as_str().unwrap(), attempt_id);
        assert_eq!(store.top_scores(10).len(), 1);

        let resp = call(
            "leaderboard",
            serde_json::json!({"student": "SE123456"}),
            &session,
            &store,
            &inject,
        );
        assert_eq!(resp["data"]["entries"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn register_rejects_bad_student_id() {
        let (session, store, inject) = fixture();
        let resp = call(
            "register",
            serde_json::json!({"name": "Ada", "student_id": "bogus"}),
            &session,
            &store,
            &inject,
        );
        assert_eq!(resp["ok"], false);
        assert!(session.lock().unwrap().is_none());
    }

    #[test]
    fn answer_out_of_range_is_reported_not_applied() {
        let (session, store, inject) = fixture();
        call(
            "register",
            serde_json::json!({"name": "Ada", "student_id": "SE123456"}),
            &session,
            &store,
            &inject,
        );
        let resp = call(
            "answer",
            serde_json::json!({"index": 9}),
            &session,
            &store,
            &inject,
        );
        assert_eq!(resp["ok"], false);
        assert!(!dispatch::answer_selected(&session));
    }

    #[test]
    fn advance_without_session_is_an_error() {
        let (session, store, inject) = fixture();
        let resp = call("advance", serde_json::json!({}), &session, &store, &inject);
        assert_eq!(resp["ok"], false);
    }

    #[test]
    fn gesture_op_validates_the_label() {
        let (session, store, inject) = fixture();
        let resp = call(
            "gesture",
            serde_json::json!({"label": "wave"}),
            &session,
            &store,
            &inject,
        );
        assert_eq!(resp["ok"], false);
    }
}
