//! `primer3_core` as a [`PrimerDesigner`], talking Boulder-IO over stdin.

use crate::{
    config::PcrConfig,
    primers::{check_junction_request, DesignError, JunctionPrimers, JunctionRequest, Primer, PrimerDesigner},
    target::reverse_complement,
};
use std::{
    collections::HashMap,
    io::{ErrorKind, Write},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

const DEFAULT_PRIMER3_BIN: &str = "primer3_core";
const PRIMER3_ENV_BIN: &str = "GENTLE_PRIMER3_BIN";
const RECORD_END: &str = "=";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which end of the template the primer anneals to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Forward primer at the 5' end
    Left,
    /// Reverse primer at the 3' end
    Right,
}

impl Side {
    fn tag(self) -> &'static str {
        match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Primer3Designer {
    executable: String,
    conf: PcrConfig,
    max_tail: usize,
    timeout: Duration,
}

fn primer3_executable() -> String {
    std::env::var(PRIMER3_ENV_BIN)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_PRIMER3_BIN.to_string())
}

impl Primer3Designer {
    pub fn new(conf: &PcrConfig, min_homology: usize) -> Self {
        Self {
            executable: primer3_executable(),
            conf: conf.clone(),
            max_tail: conf.max_embed_length + min_homology,
            timeout: Duration::from_secs(conf.tool_timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_executable(mut self, executable: &str) -> Self {
        self.executable = executable.to_string();
        self
    }

    fn run(&self, record: &str) -> Result<String, DesignError> {
        let mut child = Command::new(&self.executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DesignError::ToolNotFound {
                    executable: self.executable.clone(),
                },
                _ => DesignError::Io(e),
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(record.as_bytes())?;
        }
        // a single record's output fits in the pipe buffer
        let deadline = Instant::now() + self.timeout;
        while child.try_wait()?.is_none() {
            if Instant::now() >= deadline {
                child.kill()?;
                child.wait()?;
                return Err(DesignError::Timeout {
                    executable: self.executable.clone(),
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(DesignError::ToolFailed {
                command: self.executable.clone(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// A primer on `template` with `tail` in front of its annealing part.
    /// For [`Side::Right`] the tail is given on the top strand.
    fn primer(&self, template: &str, side: Side, tail: &str) -> Result<Primer, DesignError> {
        if tail.len() > self.max_tail {
            return Err(DesignError::NoPrimers {
                reason: format!("{} bp tail exceeds {} bp", tail.len(), self.max_tail),
            });
        }
        let record = boulder_record(template, side, &self.conf);
        let (anneal, tm, penalty) = parse_record(&self.run(&record)?, side)?;
        let tail = match side {
            Side::Left => tail.to_ascii_uppercase(),
            Side::Right => reverse_complement(tail),
        };
        debug!(side = side.tag(), anneal = %anneal, tm, penalty, "primer3 primer");
        Ok(Primer {
            seq: format!("{tail}{}", anneal.to_ascii_uppercase()),
            tm,
            penalty,
            tail_len: tail.len(),
        })
    }
}

/// Input record asking for a single primer forced onto one end of
/// `template`.
fn boulder_record(template: &str, side: Side, conf: &PcrConfig) -> String {
    let template = template.to_ascii_uppercase();
    let (pick_left, pick_right, force) = match side {
        Side::Left => (1, 0, "SEQUENCE_FORCE_LEFT_START=0".to_string()),
        Side::Right => (
            0,
            1,
            format!("SEQUENCE_FORCE_RIGHT_START={}", template.len().saturating_sub(1)),
        ),
    };
    let lines = [
        "SEQUENCE_ID=gentle_assembly".to_string(),
        format!("SEQUENCE_TEMPLATE={template}"),
        "PRIMER_TASK=generic".to_string(),
        format!("PRIMER_PICK_LEFT_PRIMER={pick_left}"),
        "PRIMER_PICK_INTERNAL_OLIGO=0".to_string(),
        format!("PRIMER_PICK_RIGHT_PRIMER={pick_right}"),
        force,
        format!("PRIMER_OPT_TM={:.1}", conf.target_tm),
        format!("PRIMER_MIN_SIZE={}", conf.min_anneal_length),
        format!("PRIMER_MAX_SIZE={}", conf.max_anneal_length),
        format!("PRIMER_OPT_SIZE={}", conf.min_anneal_length.max(20).min(conf.max_anneal_length)),
        "PRIMER_NUM_RETURN=1".to_string(),
        "PRIMER_EXPLAIN_FLAG=1".to_string(),
        RECORD_END.to_string(),
    ];
    let mut ret = lines.join("\n");
    ret.push('\n');
    ret
}

/// Sequence, Tm and penalty of the first primer on `side` in a Boulder-IO
/// output record.
fn parse_record(text: &str, side: Side) -> Result<(String, f64, f64), DesignError> {
    let tags: HashMap<&str, &str> = text
        .lines()
        .take_while(|line| line.trim() != RECORD_END)
        .filter_map(|line| line.split_once('='))
        .collect();
    if let Some(error) = tags.get("PRIMER_ERROR") {
        return Err(DesignError::NoPrimers {
            reason: error.to_string(),
        });
    }
    let tag = side.tag();
    let Some(seq) = tags.get(format!("PRIMER_{tag}_0_SEQUENCE").as_str()) else {
        let explain = tags
            .get(format!("PRIMER_{tag}_EXPLAIN").as_str())
            .copied()
            .unwrap_or("no explanation given");
        return Err(DesignError::NoPrimers {
            reason: explain.to_string(),
        });
    };
    let number = |key: String| -> Result<f64, DesignError> {
        let value = tags.get(key.as_str()).ok_or_else(|| DesignError::BadOutput {
            reason: format!("{key} missing"),
        })?;
        value.trim().parse::<f64>().map_err(|e| DesignError::BadOutput {
            reason: format!("{key}={value}: {e}"),
        })
    };
    let tm = number(format!("PRIMER_{tag}_0_TM"))?;
    let penalty = number(format!("PRIMER_{tag}_0_PENALTY"))?;
    Ok((seq.trim().to_string(), tm, penalty))
}

impl PrimerDesigner for Primer3Designer {
    fn design_junction(&self, req: &JunctionRequest) -> Result<JunctionPrimers, DesignError> {
        check_junction_request(req)?;
        let left_reverse = self.primer(&req.left_template, Side::Right, &req.left_tail)?;
        let right_forward = self.primer(&req.right_template, Side::Left, &req.right_tail)?;
        let penalty = left_reverse.penalty + right_forward.penalty;
        if penalty > self.conf.max_pair_penalty {
            return Err(DesignError::NoPrimers {
                reason: format!(
                    "pair penalty {penalty:.1} above {:.1}",
                    self.conf.max_pair_penalty
                ),
            });
        }
        Ok(JunctionPrimers {
            left_reverse,
            right_forward,
            penalty,
        })
    }

    fn design_end(&self, template: &str) -> Result<Primer, DesignError> {
        self.primer(template, Side::Left, "")
    }
}
