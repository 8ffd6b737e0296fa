//! Replaying command runner for tests and dry environments.
//!
//! [`ScriptedRunner`] never spawns anything. Each invocation is matched
//! against registered rules (argument-vector prefix, optionally restricted
//! to a working directory whose last component matches), the canned reply
//! is streamed into the sink, and the invocation is recorded. Unmatched
//! commands succeed with empty output.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::command::CommandSpec;
use crate::error::Result;
use crate::runner::{CommandRunner, ProcessOutput};
use crate::sink::OutputSink;

/// The canned result of a scripted command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedReply {
    pub exit_code: i32,
    pub output: String,
}

impl ScriptedReply {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }
}

#[derive(Debug)]
struct Rule {
    argv: Vec<String>,
    dir: Option<String>,
    reply: ScriptedReply,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        let argv = spec.argv();
        if argv.len() < self.argv.len() || !self.argv.iter().zip(&argv).all(|(a, b)| a == b) {
            return false;
        }
        match &self.dir {
            None => true,
            Some(dir) => spec
                .dir()
                .and_then(Path::file_name)
                .is_some_and(|name| name == dir.as_str()),
        }
    }
}

/// A [`CommandRunner`] that replays canned replies. First matching rule wins.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every command whose argv starts with `argv`.
    pub fn respond(mut self, argv: &[&str], exit_code: i32, output: impl Into<String>) -> Self {
        self.rules.push(Rule {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            dir: None,
            reply: ScriptedReply::new(exit_code, output),
        });
        self
    }

    /// Like [`Self::respond`], restricted to a working directory named `dir`.
    pub fn respond_in(
        mut self,
        dir: &str,
        argv: &[&str],
        exit_code: i32,
        output: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            dir: Some(dir.to_string()),
            reply: ScriptedReply::new(exit_code, output),
        });
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of invocations whose argv starts with `argv`.
    pub fn count(&self, argv: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|spec| {
                let actual = spec.argv();
                actual.len() >= argv.len() && actual[..argv.len()] == *argv
            })
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        sink: &mut dyn OutputSink,
        _timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());

        let reply = self
            .rules
            .iter()
            .find(|rule| rule.matches(spec))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| ScriptedReply::new(0, ""));

        if !reply.output.is_empty() {
            sink.write(&reply.output);
        }
        sink.finish();
        Ok(ProcessOutput::new(reply.exit_code, reply.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .respond_in("api", &["git", "merge"], 1, "CONFLICT (content)")
            .respond(&["git", "merge"], 0, "Already up to date.");

        let in_api = CommandSpec::git(["merge", "feature"]).current_dir("/pool/0/api");
        let in_web = CommandSpec::git(["merge", "feature"]).current_dir("/pool/0/web");

        assert_eq!(runner.status(&in_api).unwrap().exit_code, 1);
        assert_eq!(runner.status(&in_web).unwrap().output, "Already up to date.");
        assert_eq!(runner.count(&["git", "merge"]), 2);
    }

    #[test]
    fn unmatched_commands_succeed_silently() {
        let runner = ScriptedRunner::new();
        let output = runner.check(&CommandSpec::git(["fetch"])).unwrap();
        assert!(output.is_success());
        assert!(output.output.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn reply_is_streamed_into_the_sink() {
        let runner = ScriptedRunner::new().respond(&["php"], 0, "migrating...\n");
        let mut sink = String::new();
        runner
            .run(&CommandSpec::new("php").arg("migration.php"), &mut sink, None)
            .unwrap();
        assert_eq!(sink, "migrating...\n");
    }
}
