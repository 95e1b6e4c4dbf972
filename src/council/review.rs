//! Peer Review and Synthesis Prompts
//!
//! Builds the anonymized review/synthesis prompts and extracts numeric
//! scores from free-form reviewer output.

use crate::council::MemberAnswer;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Build the prompt asking `answers[reviewer_idx]` to score every other
/// answer 1-10 on accuracy, insight and completeness. Answers are
/// identified only by their index.
pub fn build_review_prompt(
    original_prompt: &str,
    answers: &[MemberAnswer],
    reviewer_idx: usize,
) -> String {
    let mut listing = String::new();
    for (idx, answer) in answers.iter().enumerate() {
        if idx == reviewer_idx {
            continue;
        }
        listing.push_str(&format!("### Answer {}\n{}\n\n", idx + 1, answer.content));
    }

    format!(
        "You are reviewing anonymous answers to the question below.\n\n\
         ## Question\n{}\n\n\
         ## Answers\n{}\
         Rate each answer from 1 to 10, weighing accuracy, insight and \
         completeness against the question. Respond with one line per \
         answer, exactly in the form:\n\
         ANSWER <number>: <score>\n\
         No other commentary.",
        original_prompt, listing
    )
}

/// Build the chairman prompt embedding every valid answer, annotated with
/// its aggregated peer score when one exists.
pub fn build_synthesis_prompt(
    original_prompt: &str,
    answers: &[MemberAnswer],
    scores: &HashMap<usize, f64>,
) -> String {
    let mut listing = String::new();
    for (idx, answer) in answers.iter().enumerate() {
        let annotation = match scores.get(&idx) {
            Some(score) => format!(" (peer score {:.1}/10)", score),
            None => String::new(),
        };
        listing.push_str(&format!(
            "### Answer {}{}\n{}\n\n",
            idx + 1,
            annotation,
            answer.content
        ));
    }

    format!(
        "Several independent assistants answered the question below. Their \
         answers follow, identified only by index.\n\n\
         ## Question\n{}\n\n\
         ## Answers\n{}\
         Produce one corrected, merged answer that keeps the strongest \
         points, fixes any mistakes, and resolves contradictions. Do not \
         mention the other answers or the review process; reply with the \
         final answer only.",
        original_prompt, listing
    )
}

fn score_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*\**\s*answer\s*#?\s*(\d+)\s*\**\s*[:\-]\s*\**\s*(\d{1,2}(?:\.\d+)?)")
            .expect("score regex")
    })
}

/// Extract `(target_index, score)` pairs from reviewer output.
///
/// Indices are converted back to zero-based; scores outside 1-10 are
/// discarded rather than clamped.
pub fn parse_scores(content: &str) -> Vec<(usize, f64)> {
    score_line_re()
        .captures_iter(content)
        .filter_map(|captures| {
            let target: usize = captures.get(1)?.as_str().parse().ok()?;
            let score: f64 = captures.get(2)?.as_str().parse().ok()?;
            if target == 0 || !(1.0..=10.0).contains(&score) {
                return None;
            }
            Some((target - 1, score))
        })
        .collect()
}

/// Mean score per target. Targets nobody scored are absent, not zero.
pub fn aggregate_scores(
    collected: &[(usize, f64)],
    answer_count: usize,
) -> HashMap<usize, f64> {
    let mut sums: HashMap<usize, (f64, usize)> = HashMap::new();
    for &(target, score) in collected {
        if target >= answer_count {
            continue;
        }
        let entry = sums.entry(target).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(target, (sum, count))| (target, sum / count as f64))
        .collect()
}
