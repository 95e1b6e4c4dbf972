//! Council Consensus Engine
//!
//! Fans a request out to several providers in parallel, optionally has the
//! respondents peer-review each other, and has one chairman provider
//! synthesize a single merged answer.

pub mod review;

use crate::api::{GenerationRequest, GenerationResult};
use crate::config::CouncilSettings;
use crate::error::GatewayError;
use crate::router::Router;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One valid answer collected during fan-out
#[derive(Debug, Clone)]
pub struct MemberAnswer {
    /// Provider that answered
    pub provider: String,

    /// Model that answered
    pub model: String,

    /// The answer text
    pub content: String,

    /// Tokens the member consumed
    pub tokens_used: u32,
}

/// The consensus engine
pub struct Council {
    router: Arc<Router>,
    settings: CouncilSettings,
}

impl Council {
    pub fn new(router: Arc<Router>) -> Self {
        let settings = router.config().council.clone();
        Self { router, settings }
    }

    /// Pick up to `max_members` distinct providers with usable keys,
    /// fast tier before fallback tier, name order within a tier.
    fn select_members(&self) -> Vec<String> {
        let config = self.router.config();
        let mut members: Vec<(&String, _)> = config
            .providers
            .iter()
            .filter(|(name, _)| self.router.pools().has_usable_key(name))
            .map(|(name, profile)| (name, profile.tier))
            .collect();

        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        members
            .into_iter()
            .take(self.settings.max_members)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// First chairman candidate with usable keys, else the first respondent
    fn select_chairman(&self, answers: &[MemberAnswer]) -> String {
        let config = self.router.config();
        self.settings
            .chairman_priority
            .iter()
            .find(|name| {
                config.providers.contains_key(*name) && self.router.pools().has_usable_key(name)
            })
            .cloned()
            .unwrap_or_else(|| answers[0].provider.clone())
    }

    /// Per-member deadline, never longer than the overall request deadline.
    /// Passed into the router so an expired member still resolves its key
    /// and breaker bookkeeping instead of being cancelled from outside.
    fn member_deadline(&self) -> std::time::Duration {
        self.settings
            .member_timeout()
            .min(self.router.config().request_timeout())
    }

    /// Ask every member concurrently, each under its own deadline, and keep
    /// only the answers that came back successful.
    async fn fan_out(&self, request: &GenerationRequest, members: &[String]) -> Vec<MemberAnswer> {
        let deadline = self.member_deadline();
        let mut tasks = Vec::with_capacity(members.len());

        for member in members {
            let router = Arc::clone(&self.router);
            let request = request.clone();
            let member = member.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = router.try_generate_within(&member, &request, deadline).await;
                (member, outcome)
            }));
        }

        let mut answers = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((member, Ok(result))) => {
                    debug!(member = %member, "council member answered");
                    answers.push(MemberAnswer {
                        provider: result.provider,
                        model: result.model,
                        content: result.content,
                        tokens_used: result.tokens_used,
                    });
                }
                Ok((member, Err(err))) => {
                    warn!(member = %member, error = %err, "council member failed");
                }
                Err(err) => {
                    warn!(error = %err, "council task panicked");
                }
            }
        }

        answers
    }

    /// Peer-review round: every respondent scores every other respondent's
    /// anonymized answer. Reviewer failures only shrink the score set.
    async fn peer_review(
        &self,
        request: &GenerationRequest,
        answers: &[MemberAnswer],
    ) -> HashMap<usize, f64> {
        let deadline = self.member_deadline();
        let mut tasks = Vec::with_capacity(answers.len());

        for (reviewer_idx, reviewer) in answers.iter().enumerate() {
            let router = Arc::clone(&self.router);
            let reviewer_name = reviewer.provider.clone();
            let prompt = review::build_review_prompt(&request.prompt, answers, reviewer_idx);
            tasks.push(tokio::spawn(async move {
                let review_request = GenerationRequest::new(prompt).with_temperature(0.2);
                let outcome = router
                    .try_generate_within(&reviewer_name, &review_request, deadline)
                    .await;
                (reviewer_name, outcome)
            }));
        }

        let mut collected: Vec<(usize, f64)> = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((reviewer, Ok(result))) => {
                    let scores = review::parse_scores(&result.content);
                    debug!(reviewer = %reviewer, scores = scores.len(), "review parsed");
                    collected.extend(scores);
                }
                Ok((reviewer, Err(err))) => {
                    warn!(reviewer = %reviewer, error = %err, "reviewer failed");
                }
                Err(err) => {
                    warn!(error = %err, "review task panicked");
                }
            }
        }

        review::aggregate_scores(&collected, answers.len())
    }

    /// Run the full council flow for one request.
    ///
    /// Individual member and reviewer failures degrade the input set; only
    /// an empty valid set or a failed chairman synthesis is terminal.
    pub async fn deliberate(&self, request: &GenerationRequest) -> GenerationResult {
        let started = Instant::now();

        let members = self.select_members();
        if members.is_empty() {
            return GenerationResult::failure(
                "council",
                GatewayError::AllCouncilMembersFailed(
                    "no providers with usable keys".to_string(),
                )
                .to_string(),
            );
        }
        info!(members = ?members, "council convened");

        let answers = self.fan_out(request, &members).await;
        if answers.is_empty() {
            return GenerationResult::failure(
                "council",
                GatewayError::AllCouncilMembersFailed(format!(
                    "{} members asked, none answered",
                    members.len()
                ))
                .to_string(),
            );
        }
        info!(valid = answers.len(), asked = members.len(), "council quorum reached");

        let scores = if self.settings.peer_review && answers.len() >= 2 {
            self.peer_review(request, &answers).await
        } else {
            HashMap::new()
        };

        let chairman = self.select_chairman(&answers);
        let synthesis_prompt = review::build_synthesis_prompt(&request.prompt, &answers, &scores);
        let mut synthesis_request = GenerationRequest::new(synthesis_prompt)
            .with_temperature(request.options.temperature)
            .with_max_tokens(request.options.max_tokens);
        synthesis_request.system_prompt = request.system_prompt.clone();

        match self
            .router
            .try_generate(&chairman, &synthesis_request)
            .await
        {
            Ok(synthesis) => {
                let member_tokens: u32 = answers.iter().map(|a| a.tokens_used).sum();
                GenerationResult {
                    success: true,
                    content: synthesis.content,
                    provider: "council".to_string(),
                    model: format!("council/{}-members", answers.len()),
                    tokens_used: member_tokens + synthesis.tokens_used,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    error: None,
                }
            }
            Err(err) => {
                warn!(chairman = %chairman, error = %err, "council synthesis failed");
                GenerationResult::failure(
                    "council",
                    format!("synthesis by '{}' failed: {}", chairman, err),
                )
            }
        }
    }
}
