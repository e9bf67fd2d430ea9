use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{env, process::Command};

use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("quizctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: quizctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some("doctor") => {
            let r = ipc::client_request(serde_json::json!({"op":"doctor"}))?;
            print_response(&r);
            Ok(())
        }

        Some("register") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: quizctl register <name> <student_id>"))?;
            let id: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: quizctl register <name> <student_id>"))?;
            let r = ipc::client_request(
                serde_json::json!({"op":"register","name":name,"student_id":id}),
            )?;
            print_response(&r);
            Ok(())
        }

        Some("answer") => {
            let option: usize = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: quizctl answer <option 1-4>"))?;
            if option == 0 {
                return Err(anyhow!("options are numbered from 1"));
            }
            let r = ipc::client_request(serde_json::json!({"op":"answer","index":option - 1}))?;
            print_response(&r);
            Ok(())
        }

        Some("next") => {
            let r = ipc::client_request(serde_json::json!({"op":"advance"}))?;
            print_response(&r);
            Ok(())
        }

        Some("prev") => {
            let r = ipc::client_request(serde_json::json!({"op":"previous"}))?;
            print_response(&r);
            Ok(())
        }

        Some("results") => {
            let r = ipc::client_request(serde_json::json!({"op":"results"}))?;
            print_response(&r);
            Ok(())
        }

        Some("leaderboard") => {
            let mut req = serde_json::json!({"op":"leaderboard"});
            if let Ok(Some(limit)) = pargs.opt_value_from_str::<_, u64>("--limit") {
                req["limit"] = limit.into();
            }
            if let Ok(Some(student)) = pargs.opt_value_from_str::<_, String>("--student") {
                req["student"] = student.into();
            }
            let r = ipc::client_request(req)?;
            print_response(&r);
            Ok(())
        }

        Some("emit") => {
            // usage: quizctl emit <one|two|three|four|thumb_up>
            let label: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: quizctl emit <one|two|three|four|thumb_up>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"gesture","label":label}))?;
            print_response(&r);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"quizctl — gesture-driven AI quiz daemon

USAGE:
  quizctl help [command]                  Show general or command-specific help
  quizctl start                           Start the daemon
  quizctl stop                            Stop the daemon
  quizctl status                          Show daemon state and detected gesture
  quizctl reload                          Reload active profile
  quizctl use <name>                      Switch active profile
  quizctl list                            List profiles
  quizctl doctor                          Diagnose cameras/permissions
  quizctl register <name> <student_id>    Start a quiz session (id: SE123456)
  quizctl answer <1-4>                    Answer the current question
  quizctl next                            Confirm and move to the next question
  quizctl prev                            Step back one question
  quizctl results                         Score, save and show the finished quiz
  quizctl leaderboard [--limit N]         Show top scores
  quizctl leaderboard --student <id>      Show one student's history
  quizctl emit <gesture>                  Inject a gesture (one..four, thumb_up)

TIPS:
  - Profiles: ~/.config/quizctl/profiles
  - Active profile pointer: ~/.config/quizctl/active
  - Results store: ~/.local/share/quizctl
  - Camera-less demo: point [source] replay at demos/replay-walkthrough.toml
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: quizctl start\nStarts the background daemon."),
        "stop" => println!("usage: quizctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: quizctl status\nShows active profile, pipeline phase, detected gesture and session progress."
        ),
        "reload" => println!(
            "usage: quizctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: quizctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: quizctl list\nLists available profiles.")
        }
        "doctor" => println!(
            "usage: quizctl doctor\nChecks camera devices, group membership and profile paths."
        ),
        "register" => println!(
            "usage: quizctl register <name> <student_id>\nStarts a new quiz session. Student id is two letters and six digits."
        ),
        "answer" => println!(
            "usage: quizctl answer <1-4>\nRecords an answer for the current question."
        ),
        "next" => println!(
            "usage: quizctl next\nMoves to the next question; requires an answer. Finishes the quiz on the last question."
        ),
        "prev" => println!("usage: quizctl prev\nSteps back one question."),
        "results" => println!(
            "usage: quizctl results\nScores a completed quiz, saves it to the leaderboard and prints the outcome."
        ),
        "leaderboard" => println!(
            "usage:\n  quizctl leaderboard [--limit N]\n  quizctl leaderboard --student <id>"
        ),
        "emit" => println!(
            "usage: quizctl emit <one|two|three|four|thumb_up>\nInjects a gesture through the same debounce path as the camera."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
