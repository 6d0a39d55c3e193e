//! Tests for status, pause, resume, remove.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_status() {
    match parse(&["rfetch", "status"]) {
        CliCommand::Status => {}
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_pause() {
    match parse(&["rfetch", "pause", "task-abc-1"]) {
        CliCommand::Pause { id } => assert_eq!(id, "task-abc-1"),
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_resume() {
    match parse(&["rfetch", "resume", "task-abc-1"]) {
        CliCommand::Resume { id } => assert_eq!(id, "task-abc-1"),
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_remove() {
    match parse(&["rfetch", "remove", "task-abc-1"]) {
        CliCommand::Remove { id } => assert_eq!(id, "task-abc-1"),
        _ => panic!("expected Remove"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["rfetch", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell.to_string(), "bash"),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn cli_parse_man() {
    match parse(&["rfetch", "man"]) {
        CliCommand::Man => {}
        _ => panic!("expected Man"),
    }
}
