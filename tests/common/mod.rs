//! Common test utilities: a scripted command runner and host layouts.

#![allow(dead_code)]

mod fixtures;

pub use fixtures::*;

use q2_provision::{CommandRunner, ProcessEnv, Settings, StageResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type Effect = Box<dyn Fn(&[String])>;

/// A reply to one invocation.
#[derive(Clone)]
pub struct Reply {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

struct Rule {
    program: String,
    arg: Option<String>,
    replies: Vec<Reply>,
    hits: usize,
    effect: Option<Effect>,
}

impl Rule {
    fn matches(&self, argv: &[String]) -> bool {
        let Some(program) = argv.first() else {
            return false;
        };
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name == self.program
            && self
                .arg
                .as_ref()
                .is_none_or(|arg| argv[1..].iter().any(|a| a == arg))
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub argv: Vec<String>,
    pub env: ProcessEnv,
}

impl Call {
    pub fn program(&self) -> String {
        Path::new(&self.argv[0])
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Matches commands by executable name (and optionally one argument) and
/// replies with canned output. Unscripted commands exit 127.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    pub calls: Vec<Call>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, program: &str, arg: Option<&str>, reply: Reply) -> Self {
        self.on_seq(program, arg, vec![reply])
    }

    /// Successive calls get successive replies; the last one repeats.
    pub fn on_seq(mut self, program: &str, arg: Option<&str>, replies: Vec<Reply>) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            arg: arg.map(str::to_string),
            replies,
            hits: 0,
            effect: None,
        });
        self
    }

    /// Like `on`, but also runs `effect` (e.g. creating files) when matched.
    pub fn on_with(
        mut self,
        program: &str,
        arg: Option<&str>,
        reply: Reply,
        effect: impl Fn(&[String]) + 'static,
    ) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            arg: arg.map(str::to_string),
            replies: vec![reply],
            hits: 0,
            effect: Some(Box::new(effect)),
        });
        self
    }

    pub fn count(&self, program: &str, arg: Option<&str>) -> usize {
        self.calls
            .iter()
            .filter(|c| {
                c.program() == program && arg.is_none_or(|a| c.argv[1..].iter().any(|x| x == a))
            })
            .count()
    }

    pub fn ran(&self, program: &str, arg: Option<&str>) -> bool {
        self.count(program, arg) > 0
    }

    pub fn find(&self, program: &str, arg: Option<&str>) -> Option<&Call> {
        self.calls.iter().find(|c| {
            c.program() == program && arg.is_none_or(|a| c.argv[1..].iter().any(|x| x == a))
        })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&mut self, argv: &[String], env: &ProcessEnv, marker: Option<&str>) -> StageResult {
        self.calls.push(Call {
            argv: argv.to_vec(),
            env: env.clone(),
        });

        let Some(rule) = self.rules.iter_mut().find(|r| r.matches(argv)) else {
            return StageResult::classify(127, String::new(), format!("not scripted: {}", argv.join(" ")), marker);
        };

        let reply = rule.replies[rule.hits.min(rule.replies.len() - 1)].clone();
        rule.hits += 1;
        if let Some(ref effect) = rule.effect {
            effect(argv);
        }
        StageResult::classify(reply.exit_code, reply.stdout, reply.stderr, marker)
    }
}

/// A throwaway host: runtime, environment and work dirs under one temp dir.
pub fn test_host() -> (TempDir, Settings) {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let settings = Settings {
        runtime_prefix: dir.path().join("miniforge3"),
        env_prefix: dir.path().join("qiime2_env"),
        work_dir: work,
        ..Settings::default()
    };
    (dir, settings)
}

pub fn base_env() -> ProcessEnv {
    ProcessEnv::from_pairs([("PATH", "/usr/local/bin:/usr/bin:/bin"), ("HOME", "/root")])
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "").unwrap();
}

/// Lay out a Miniforge install.
pub fn make_runtime(prefix: &Path) {
    touch(&prefix.join("bin/conda"));
    touch(&prefix.join("bin/mamba"));
}

/// Lay out a QIIME 2 environment for the given Python.
pub fn make_environment(prefix: &Path, python: (u32, u32)) {
    for exe in ["qiime", "pip", "python"] {
        touch(&prefix.join("bin").join(exe));
    }
    std::fs::create_dir_all(
        prefix
            .join("lib")
            .join(format!("python{}.{}", python.0, python.1))
            .join("site-packages"),
    )
    .unwrap();
}

/// Effect for a downloader: create the `-O`/`-o` destination file.
pub fn write_download(argv: &[String]) {
    if let Some(pos) = argv.iter().position(|a| a == "-O" || a == "-o") {
        touch(&PathBuf::from(&argv[pos + 1]));
    }
}
