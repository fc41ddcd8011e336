// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text operator prompts on stdin/stdout.

use std::io::IsTerminal;

use async_trait::async_trait;
use cb_core::{Job, JobId};
use cb_engine::{Choice, CrashDecision, Interaction, Prompt, PromptPhase, Verb};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::color;

pub struct TerminalInteraction<R> {
    lines: Lines<BufReader<R>>,
    /// Piped input gets no end-of-run rerun offer
    offer_reruns: bool,
}

impl TerminalInteraction<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        let offer_reruns = std::io::stdin().is_terminal();
        Self { offer_reruns, ..Self::new(tokio::io::stdin()) }
    }
}

impl<R: AsyncRead + Unpin + Send> TerminalInteraction<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: BufReader::new(reader).lines(), offer_reruns: true }
    }

    /// None at end of input.
    async fn read_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read operator input");
                None
            }
        }
    }

    /// Ask a yes/no question; anything but yes is no.
    pub async fn confirm(&mut self, question: &str) -> bool {
        println!("{question} [y/N]");
        matches!(self.read_line().await.as_deref().map(str::trim), Some("y" | "Y" | "yes"))
    }
}

/// Parse operator input such as `s`, `skip` or `c no camera attached`.
pub fn parse_choice(input: &str, prompt: &Prompt) -> Result<Choice, String> {
    let input = input.trim();
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };
    if word.is_empty() {
        return Err(format!("choose one of {}", choice_menu(prompt)));
    }
    let verb = match word.to_ascii_lowercase().as_str() {
        "r" | "run" => Verb::Run,
        "s" | "skip" => Verb::Skip,
        "c" | "comment" => Verb::Comment,
        "p" | "pass" => Verb::Pass,
        "f" | "fail" => Verb::Fail,
        "q" | "quit" => Verb::Quit,
        _ => return Err(format!("unknown choice '{word}'; choose one of {}", choice_menu(prompt))),
    };
    if !prompt.allows(verb) {
        return Err(format!("'{verb}' is not available here; choose one of {}", choice_menu(prompt)));
    }
    if verb == Verb::Comment && rest.is_empty() {
        return Err("a comment needs text, e.g. 'c no camera attached'".to_string());
    }
    Ok(if rest.is_empty() { Choice::new(verb) } else { Choice::with_comment(verb, rest) })
}

/// Parse a rerun pick: 1-based numbers, `a`/`all`, or nothing for none.
///
/// Returns 0-based indexes in the order given, without repeats.
pub fn parse_rerun_selection(input: &str, count: usize) -> Result<Vec<usize>, String> {
    let input = input.trim();
    match input.to_ascii_lowercase().as_str() {
        "" | "n" | "none" => return Ok(Vec::new()),
        "a" | "all" => return Ok((0..count).collect()),
        _ => {}
    }
    let mut picked = Vec::new();
    for word in input.split(|c: char| c == ',' || c.is_whitespace()).filter(|w| !w.is_empty()) {
        let index = match word.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => n - 1,
            _ => return Err(format!("'{word}' is not a job number between 1 and {count}")),
        };
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    Ok(picked)
}

/// `[r]un [s]kip [c]omment [q]uit`
pub fn choice_menu(prompt: &Prompt) -> String {
    let items: Vec<String> = prompt
        .choices
        .iter()
        .map(|verb| {
            let name = verb.to_string();
            let (first, rest) = name.split_at(1);
            format!("[{first}]{rest}")
        })
        .collect();
    items.join(" ")
}

fn print_prompt(prompt: &Prompt) {
    let job = &prompt.job;
    println!();
    println!("{} {}", color::header(job.id.as_str()), color::context(&format!("({})", job.kind)));
    if !job.summary.is_empty() {
        println!("  {}", job.summary);
    }
    match prompt.phase {
        PromptPhase::Start => {
            if let Some(command) = job.command.as_deref() {
                println!("  {} {}", color::muted("command:"), color::literal(command));
            }
        }
        PromptPhase::Verdict => {
            if let Some(code) = prompt.result.as_ref().and_then(|r| r.return_code) {
                println!("  {} {code}", color::muted("exit code:"));
            }
            println!("  Did the test pass?");
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Interaction for TerminalInteraction<R> {
    async fn choose(&mut self, prompt: &Prompt) -> Choice {
        print_prompt(prompt);
        loop {
            println!("{}", choice_menu(prompt));
            let Some(line) = self.read_line().await else {
                if prompt.allows(Verb::Quit) {
                    return Choice::new(Verb::Quit);
                }
                return Choice::with_comment(prompt.default, "no operator input");
            };
            match parse_choice(&line, prompt) {
                Ok(choice) => return choice,
                Err(message) => eprintln!("{message}"),
            }
        }
    }

    async fn decide_crash(&mut self, job: &JobId, attempts: u32, can_rerun: bool) -> CrashDecision {
        if !can_rerun {
            println!("{} crashed after {attempts} attempt(s); no attempts left", color::header(job.as_str()));
            return CrashDecision::Keep;
        }
        let question = format!("{} crashed after {attempts} attempt(s). Run it again?", color::header(job.as_str()));
        if self.confirm(&question).await {
            CrashDecision::Rerun
        } else {
            CrashDecision::Keep
        }
    }

    async fn choose_reruns(&mut self, candidates: &[Job]) -> Vec<JobId> {
        if !self.offer_reruns {
            return Vec::new();
        }
        println!();
        println!("{}", color::header("Jobs that can be run again:"));
        for (n, job) in candidates.iter().enumerate() {
            println!("  {:>3}. {}", n + 1, job.id);
        }
        loop {
            println!("Rerun which? numbers, [a]ll, or Enter for none");
            let Some(line) = self.read_line().await else {
                return Vec::new();
            };
            match parse_rerun_selection(&line, candidates.len()) {
                Ok(picked) => {
                    return picked.into_iter().filter_map(|i| candidates.get(i)).map(|j| j.id.clone()).collect();
                }
                Err(message) => eprintln!("{message}"),
            }
        }
    }

    fn rejected(&mut self, _prompt: &Prompt, reason: &str) {
        eprintln!("{reason}");
    }
}

#[cfg(test)]
#[path = "interaction_tests.rs"]
mod tests;
