//! The distribution engine.
//!
//! For each queued opportunity it assembles a candidate view per known
//! user, screens eligibility, selects recipients fairly, and walks the
//! CAS ladder (recipient slot, then daily quota, then delivery), skipping
//! the user on any conflict and continuing the cycle. Group-context
//! recipients get a public-safe announcement in the group and the full
//! detail in their private chat.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use access::resolver::{FeatureFlags, resolve};
use analytics::AuditLedger;
use common::logging::warn_if_slow;
use common::time::utc_date;
use detector::types::Opportunity;
use notifier::{
    ChannelTarget, Notifier, PayloadKind, render_opportunity, render_public_summary,
};
use profile::ProfileManager;
use profile::model::UserProfile;
use profile::repository::ProfileRepository;

use crate::eligibility::{CandidateView, Eligibility, check_candidate};
use crate::ledger::{QuotaLedger, UserResponse};
use crate::policy::{EligibleSet, select_recipients};
use crate::queue::OpportunityQueue;
use crate::state::DistributionState;
use crate::types::{DeliveryContext, FairnessConfig, TierClass};

struct Candidate {
    profile: UserProfile,
    context: DeliveryContext,
    received_before: u32,
}

pub struct DistributionEngine<R: ProfileRepository> {
    profiles: Arc<ProfileManager<R>>,
    queue: Arc<OpportunityQueue>,
    ledger: QuotaLedger,
    audit: AuditLedger,
    notifier: Arc<dyn Notifier>,
    fairness: FairnessConfig,
    flags: FeatureFlags,

    /// Explicit per-user delivery contexts (group membership); users
    /// without an entry default to their private chat.
    contexts: Mutex<HashMap<Uuid, DeliveryContext>>,
    state: Mutex<DistributionState>,
}

impl<R: ProfileRepository> DistributionEngine<R> {
    pub fn new(
        profiles: Arc<ProfileManager<R>>,
        queue: Arc<OpportunityQueue>,
        ledger: QuotaLedger,
        audit: AuditLedger,
        notifier: Arc<dyn Notifier>,
        fairness: FairnessConfig,
        flags: FeatureFlags,
    ) -> Self {
        Self {
            profiles,
            queue,
            ledger,
            audit,
            notifier,
            fairness,
            flags,
            contexts: Mutex::new(HashMap::new()),
            state: Mutex::new(DistributionState::new()),
        }
    }

    /// Route a user's deliveries through a group context from now on.
    pub async fn set_delivery_context(&self, user_id: Uuid, context: DeliveryContext) {
        self.contexts.lock().await.insert(user_id, context);
    }

    async fn context_for(&self, profile: &UserProfile) -> DeliveryContext {
        let contexts = self.contexts.lock().await;
        contexts
            .get(&profile.user_id)
            .cloned()
            .unwrap_or_else(|| DeliveryContext::private(profile.external_chat_id))
    }

    /// Candidate intake from the detector. The durable mirror write happens
    /// inside `queue.push`; if it fails the opportunity is not emitted.
    #[instrument(skip(self, opportunity), fields(opportunity_id = %opportunity.id, pair = %opportunity.pair))]
    pub async fn on_candidate(&self, opportunity: Opportunity, now_ms: u64) -> anyhow::Result<()> {
        let detail = serde_json::json!({
            "pair": opportunity.pair.id(),
            "net_bps": opportunity.net_rate_difference.raw(),
            "score": opportunity.priority_score,
        });

        warn_if_slow("opportunity_mirror_write", Duration::from_millis(100), async {
            self.queue.push(opportunity.clone(), now_ms).await
        })
        .await?;
        self.audit.record_detection(&opportunity.id, detail, now_ms).await;
        Ok(())
    }

    /// Drain the queue for this tick. Returns total deliveries made.
    pub async fn distribute_pending(&self, now_ms: u64) -> usize {
        let mut tick_deliveries: HashMap<Uuid, u32> = HashMap::new();
        let mut total = 0;

        while let Some(opportunity) = self.queue.pop_live(now_ms).await {
            match self
                .distribute_one(&opportunity, &mut tick_deliveries, now_ms)
                .await
            {
                Ok(count) => total += count,
                Err(e) => {
                    warn!(
                        opportunity_id = %opportunity.id,
                        error = %e,
                        "distribution failed for opportunity; cycle continues"
                    );
                }
            }
        }

        total
    }

    #[instrument(skip_all, fields(opportunity_id = %opportunity.id, pair = %opportunity.pair))]
    async fn distribute_one(
        &self,
        opportunity: &Opportunity,
        tick_deliveries: &mut HashMap<Uuid, u32>,
        now_ms: u64,
    ) -> anyhow::Result<usize> {
        let date = utc_date(now_ms);
        let pair_id = opportunity.pair.id();

        let boosted: HashSet<Uuid> = self
            .audit
            .recent_executors(now_ms)
            .await
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut eligible = EligibleSet::default();
        let mut candidates: HashMap<Uuid, Candidate> = HashMap::new();

        for profile in self.profiles.cached_profiles().await {
            if profile.archived {
                continue;
            }

            let context = self.context_for(&profile).await;
            let recently_active = boosted.contains(&profile.user_id);
            let limit = self.fairness.effective_daily_limit(
                profile.tier,
                context.is_group,
                recently_active,
            );

            let row = match self
                .ledger
                .fetch_or_create(
                    &profile.user_id,
                    &date,
                    &context.context_id,
                    limit,
                    limit,
                    context.is_group,
                    now_ms,
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(user_id = %profile.user_id, error = %e, "ledger unavailable for user; skipping");
                    continue;
                }
            };

            let already_delivered = self
                .ledger
                .was_delivered(&opportunity.id, &profile.user_id)
                .await
                .unwrap_or(false);

            let view = CandidateView {
                session_active: self
                    .profiles
                    .has_active_session(&profile.user_id, now_ms)
                    .await,
                preferences: profile.preferences.clone(),
                permissions: resolve(
                    profile.tier,
                    profile.role,
                    profile.beta_active(now_ms),
                    &self.flags,
                ),
                received_today: row.received(opportunity.kind),
                effective_daily_limit: row.limit(opportunity.kind),
                last_delivery_ms: (row.last_delivery_ms > 0).then_some(row.last_delivery_ms),
                deliveries_this_tick: tick_deliveries
                    .get(&profile.user_id)
                    .copied()
                    .unwrap_or(0),
                already_delivered,
            };

            match check_candidate(&view, opportunity.kind, &pair_id, &self.fairness, now_ms) {
                Eligibility::Eligible => {
                    eligible.push(TierClass::of(profile.tier), profile.user_id);
                    candidates.insert(
                        profile.user_id,
                        Candidate {
                            received_before: row.received(opportunity.kind),
                            context,
                            profile,
                        },
                    );
                }
                reason => {
                    debug!(user_id = %profile.user_id, reason = reason.as_str(), "candidate ineligible");
                    self.audit
                        .record_distribution_denied(
                            &opportunity.id,
                            &profile.user_id,
                            reason.as_str(),
                            now_ms,
                        )
                        .await;
                }
            }
        }

        if eligible.is_empty() {
            debug!("no eligible recipients this tick");
            return Ok(0);
        }

        let (current, max) = self
            .queue
            .current_recipients(&opportunity.id)
            .await?
            .unwrap_or((opportunity.current_recipients, opportunity.max_recipients));
        let capacity = max.saturating_sub(current) as usize;

        let selected = {
            let mut state = self.state.lock().await;
            select_recipients(
                &eligible,
                capacity,
                &self.fairness.tier_multipliers,
                &boosted,
                &mut state,
            )
        };

        let mut announced_groups: HashSet<String> = HashSet::new();
        let mut expected_current = current;
        let mut delivered = 0;

        for user_id in selected {
            let Some(candidate) = candidates.get(&user_id) else {
                continue;
            };

            // Step 1: claim a recipient slot under CAS.
            if !self
                .claim_slot(&opportunity.id, &mut expected_current)
                .await?
            {
                self.audit
                    .record_distribution_denied(
                        &opportunity.id,
                        &user_id,
                        "RecipientCapReached",
                        now_ms,
                    )
                    .await;
                break;
            }

            // Step 2: claim the user's daily quota under CAS.
            let quota_ok = self
                .ledger
                .try_record_delivery(
                    &user_id,
                    &date,
                    &candidate.context.context_id,
                    opportunity.kind,
                    candidate.received_before,
                    now_ms,
                )
                .await?;

            if !quota_ok {
                self.queue.release_recipient_slot(&opportunity.id).await?;
                expected_current = expected_current.saturating_sub(1);
                self.audit
                    .record_distribution_denied(&opportunity.id, &user_id, "QuotaConflict", now_ms)
                    .await;
                continue;
            }

            // Step 3: deliver; demote for groups.
            match self
                .deliver(opportunity, candidate, &mut announced_groups)
                .await
            {
                Ok(channel) => {
                    self.ledger
                        .insert_distribution_record(
                            &opportunity.id,
                            &user_id,
                            &channel,
                            UserResponse::Delivered,
                            now_ms,
                        )
                        .await?;
                    self.audit
                        .record_distribution_delivered(&opportunity.id, &user_id, &channel, now_ms)
                        .await;
                    *tick_deliveries.entry(user_id).or_insert(0) += 1;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "delivery failed terminally");
                    // The attempt is recorded so the same opportunity is not
                    // re-offered, but quota and capacity go back.
                    self.ledger
                        .insert_distribution_record(
                            &opportunity.id,
                            &user_id,
                            "none",
                            UserResponse::Failed,
                            now_ms,
                        )
                        .await?;
                    self.ledger
                        .release_delivery(
                            &user_id,
                            &date,
                            &candidate.context.context_id,
                            opportunity.kind,
                        )
                        .await?;
                    self.queue.release_recipient_slot(&opportunity.id).await?;
                    expected_current = expected_current.saturating_sub(1);
                }
            }
        }

        info!(delivered, capacity, "opportunity distributed");
        Ok(delivered)
    }

    async fn claim_slot(
        &self,
        opportunity_id: &Uuid,
        expected_current: &mut u32,
    ) -> anyhow::Result<bool> {
        for _ in 0..5 {
            if self
                .queue
                .try_claim_recipient_slot(opportunity_id, *expected_current)
                .await?
            {
                *expected_current += 1;
                return Ok(true);
            }

            match self.queue.current_recipients(opportunity_id).await? {
                Some((cur, max)) if cur < max => *expected_current = cur,
                _ => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Context routing invariant: a group context never sees trade detail.
    /// The group gets one public-safe announcement per opportunity; the
    /// recipient gets the full payload in their private chat.
    async fn deliver(
        &self,
        opportunity: &Opportunity,
        candidate: &Candidate,
        announced_groups: &mut HashSet<String>,
    ) -> Result<String, notifier::NotifyError> {
        if candidate.context.is_group
            && announced_groups.insert(candidate.context.context_id.clone())
        {
            let group_target = ChannelTarget::GroupChat {
                chat_id: candidate.context.chat_id,
            };
            if let Err(e) = self
                .notifier
                .notify(
                    &group_target,
                    PayloadKind::PublicSummary,
                    &render_public_summary(opportunity),
                )
                .await
            {
                warn!(error = %e, "group announcement failed; private delivery proceeds");
            }
        }

        let target = ChannelTarget::PrivateChat {
            chat_id: candidate.profile.external_chat_id,
        };
        self.notifier
            .notify(
                &target,
                PayloadKind::TradeOpportunity,
                &render_opportunity(opportunity),
            )
            .await?;

        Ok(target.as_record_str())
    }

    /// Maintenance hook: purge expired queue entries.
    pub async fn purge_expired(&self, now_ms: u64) -> usize {
        self.queue.purge_expired(now_ms).await
    }

    /// Record a user's execution of a delivered opportunity; feeds the
    /// activity boost and flips the distribution record.
    pub async fn record_execution(
        &self,
        opportunity_id: &Uuid,
        user_id: &Uuid,
        detail: serde_json::Value,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        self.ledger
            .update_user_response(opportunity_id, user_id, UserResponse::Executed)
            .await?;
        self.audit
            .record_execution(user_id, opportunity_id, detail, now_ms)
            .await?;
        Ok(())
    }
}
