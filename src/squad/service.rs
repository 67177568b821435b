use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{SettingsError, StoreError};
use crate::gateway::{ChatGateway, GatewayError, ResetNotice};
use crate::instance::Instance;
use crate::schedule::{DeadlineSchedule, ScheduleError, parse_time_of_day, parse_weekday};
use crate::timezone::TimezoneProvider;

use super::config::SquadConfig;
use super::history::{DataExport, ExportBucket, ExportItem, HistoryError, bucket_history};
use super::models::{Deadline, Participation, PinnedNotice, Report};
use super::stats;

// One approval at a time, process-wide, so two concurrent approvals can
// never both pass the duplicate check. Serializes across communities.
static APPROVAL_GATE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Maximum lead time for a report to count toward the pending deadline.
fn grace_window() -> Duration {
    Duration::days(7) + Duration::minutes(1)
}

#[derive(Debug, Error)]
pub enum SquadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("community is not fully configured")]
    NotConfigured,
    #[error("deadline generation produced no upcoming instant")]
    DeadlineGeneration,
}

/// Business outcome of one approval attempt. Only genuine failures surface
/// as [`SquadError`]; rejections are ordinary results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    /// The member already reported this period; treated as success with no
    /// second row.
    AlreadyApproved,
    /// The report row stands but the role grant failed.
    RoleGrantFailed,
    Disabled,
    NotConfigured,
    NoUpcomingDeadline,
    OutsideGraceWindow,
}

/// The source message behind an approval request.
#[derive(Debug, Clone)]
pub struct ReportMessage {
    pub member_id: u64,
    pub message_id: u64,
    pub instant: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConfigSummary {
    pub channel_id: Option<u64>,
    pub role_id: Option<u64>,
    pub time_of_day: Option<String>,
    pub weekday: Option<String>,
    pub timezone: Option<String>,
    pub enabled: bool,
    pub next_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub deadlines_added: u32,
    pub reports_added: u32,
    /// Buckets withheld because their deadline sits inside the grace window
    /// of the pending one; live approvals own that period.
    pub skipped_recent: u32,
}

/// Recap of the period that just closed, gathered before the next deadline
/// row is inserted: who reported, and whether the turnout beat every earlier
/// period's.
#[derive(Debug, Default)]
struct ResetRecap {
    closed_id: Option<Uuid>,
    members: Vec<u64>,
    /// Highest report count among the earlier periods; 0 when this was the
    /// first.
    previous_best: usize,
}

impl ResetRecap {
    fn for_period(closed: Option<&Deadline>, reports: &[Report]) -> Self {
        let Some(closed) = closed else {
            return Self::default();
        };

        let mut members: Vec<u64> = reports
            .iter()
            .filter(|r| r.deadline_id == closed.id)
            .map(|r| r.member_id)
            .collect();
        members.sort_unstable();
        members.dedup();

        let mut counts: HashMap<Uuid, usize> = HashMap::new();
        for report in reports.iter().filter(|r| r.deadline_id != closed.id) {
            *counts.entry(report.deadline_id).or_default() += 1;
        }
        let previous_best = counts.values().copied().max().unwrap_or(0);

        Self {
            closed_id: Some(closed.id),
            members,
            previous_best,
        }
    }

    fn compose(&self, next: DateTime<Utc>) -> String {
        let mut body = format!("{} members reported this period.\n", self.members.len());
        for member in &self.members {
            body.push_str(&format!("- <@{member}>\n"));
        }
        if self.previous_best > 0 && self.members.len() > self.previous_best {
            body.push_str(&format!(
                "That's a new record, up from {}!\n",
                self.previous_best
            ));
        }
        body.push_str(&format!(
            "Post your progress before {} to keep your streak going.",
            next.format("%A %H:%M UTC")
        ));
        body
    }
}

/// The squad logic itself: approvals, weekly resets, statistics, and
/// history export/import, all against one community instance at a time.
pub struct SquadService {
    gateway: Arc<dyn ChatGateway>,
    timezones: Arc<TimezoneProvider>,
}

impl SquadService {
    pub fn new(gateway: Arc<dyn ChatGateway>, timezones: Arc<TimezoneProvider>) -> Self {
        Self { gateway, timezones }
    }

    fn schedule_for(&self, config: &SquadConfig) -> Result<DeadlineSchedule, SquadError> {
        let time = config.time_of_day().ok_or(SquadError::NotConfigured)?;
        let weekday = config.weekday().ok_or(SquadError::NotConfigured)?;
        let zone = config.timezone().ok_or(SquadError::NotConfigured)?;
        Ok(DeadlineSchedule::new(
            parse_weekday(&weekday)?,
            parse_time_of_day(&time)?,
            self.timezones.resolve(&zone)?,
        ))
    }

    /// Applies a full schedule configuration and establishes the next
    /// deadline. Inputs are validated before anything is mutated.
    pub fn configure(
        &self,
        instance: &Instance,
        channel_id: u64,
        role_id: u64,
        time_of_day: &str,
        weekday: &str,
        timezone: &str,
    ) -> Result<DateTime<Utc>, SquadError> {
        let schedule = DeadlineSchedule::new(
            parse_weekday(weekday)?,
            parse_time_of_day(time_of_day)?,
            self.timezones.resolve(timezone)?,
        );

        {
            let mut config = instance.config.write();
            config.set_channel_id(channel_id);
            config.set_role_id(role_id);
            config.set_time_of_day(time_of_day);
            config.set_weekday(weekday);
            config.set_timezone(timezone);
        }
        instance.persist_config()?;

        let next = self.establish_next_deadline(instance, &schedule)?;
        info!(
            "Community {} configured; next deadline {}",
            instance.id(),
            next
        );
        Ok(next)
    }

    pub fn set_enabled(&self, instance: &Instance, enabled: bool) -> Result<(), SquadError> {
        instance.config.write().set_enabled(enabled);
        instance.persist_config()?;
        info!("Community {} enabled={}", instance.id(), enabled);
        Ok(())
    }

    pub fn config_summary(&self, instance: &Instance) -> Result<ConfigSummary, SquadError> {
        let config = instance.config.read().clone();
        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let now = Utc::now();
        let next_deadline = deadlines
            .iter()
            .map(|d| d.instant)
            .max()
            .filter(|i| *i > now);
        Ok(ConfigSummary {
            channel_id: config.channel_id(),
            role_id: config.role_id(),
            time_of_day: config.time_of_day(),
            weekday: config.weekday(),
            timezone: config.timezone(),
            enabled: config.enabled(),
            next_deadline,
        })
    }

    pub fn participation(
        &self,
        instance: &Instance,
        member_id: u64,
    ) -> Result<Participation, SquadError> {
        let config = instance.config.read().clone();
        let schedule = self.schedule_for(&config)?;
        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let reports: Vec<Report> = instance.database.select()?.collect();
        Ok(stats::participation(
            &schedule, &deadlines, &reports, member_id,
        ))
    }

    /// Validates and commits one report, then requests the role grant.
    /// Mutually exclusive with every other approval in the process.
    pub async fn try_approve(
        &self,
        instance: &Instance,
        report: ReportMessage,
    ) -> Result<ApprovalOutcome, SquadError> {
        let _guard = APPROVAL_GATE.lock().await;

        let config = instance.config.read().clone();
        if !config.is_configured() {
            return Ok(ApprovalOutcome::NotConfigured);
        }
        if !config.enabled() {
            return Ok(ApprovalOutcome::Disabled);
        }

        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let Some(pending) = deadlines.iter().max_by_key(|d| d.instant) else {
            return Ok(ApprovalOutcome::NoUpcomingDeadline);
        };
        if pending.instant < report.instant {
            return Ok(ApprovalOutcome::NoUpcomingDeadline);
        }
        if pending.instant - report.instant > grace_window() {
            return Ok(ApprovalOutcome::OutsideGraceWindow);
        }

        let existing: Vec<Report> = instance.database.select()?.collect();
        if existing
            .iter()
            .any(|r| r.member_id == report.member_id && r.deadline_id == pending.id)
        {
            return Ok(ApprovalOutcome::AlreadyApproved);
        }

        instance.database.insert(&Report {
            id: Uuid::new_v4(),
            member_id: report.member_id,
            message_id: report.message_id,
            instant: report.instant,
            deadline_id: pending.id,
        })?;
        info!(
            "Approved report from member {} in community {}",
            report.member_id,
            instance.id()
        );

        if let Some(role_id) = config.role_id() {
            if let Err(e) = self.gateway.grant_role(report.member_id, role_id).await {
                warn!(
                    "Role grant for member {} in community {} failed: {}",
                    report.member_id,
                    instance.id(),
                    e
                );
                return Ok(ApprovalOutcome::RoleGrantFailed);
            }
        }
        Ok(ApprovalOutcome::Approved)
    }

    /// Periodic callback for one community. Runs the weekly reset once the
    /// pending deadline has passed.
    pub async fn on_tick(&self, instance: &Instance) -> Result<(), SquadError> {
        let config = instance.config.read().clone();
        if !config.enabled() || !config.is_configured() {
            return Ok(());
        }
        let schedule = self.schedule_for(&config)?;

        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let Some(pending) = deadlines.iter().max_by_key(|d| d.instant).cloned() else {
            self.establish_next_deadline(instance, &schedule)?;
            return Ok(());
        };
        if pending.instant <= Utc::now() {
            self.handle_deadline(instance, &config, &schedule).await?;
        }
        Ok(())
    }

    /// Forces deadline handling as if the pending deadline were due, for
    /// operator verification.
    pub async fn simulate_reset(&self, instance: &Instance) -> Result<(), SquadError> {
        let config = instance.config.read().clone();
        if !config.is_configured() {
            return Err(SquadError::NotConfigured);
        }
        let schedule = self.schedule_for(&config)?;
        self.establish_next_deadline(instance, &schedule)?;
        self.handle_deadline(instance, &config, &schedule).await
    }

    /// The weekly reset: open the next period, drop members whose standing
    /// lapsed, and announce the new deadline with a recap of the one that
    /// just closed.
    async fn handle_deadline(
        &self,
        instance: &Instance,
        config: &SquadConfig,
        schedule: &DeadlineSchedule,
    ) -> Result<(), SquadError> {
        info!("Weekly reset for community {}", instance.id());

        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let reports: Vec<Report> = instance.database.select()?.collect();
        let closed = deadlines.iter().max_by_key(|d| d.instant).cloned();
        let recap = ResetRecap::for_period(closed.as_ref(), &reports);

        let latest = closed.as_ref().map(|d| d.instant);
        let next_instant = schedule
            .instants(None)
            .find(|i| latest.is_none_or(|l| *i > l))
            .ok_or(SquadError::DeadlineGeneration)?;
        let next = Deadline::at(next_instant);
        instance.database.insert(&next)?;

        self.clear_lapsed(instance, config, schedule).await?;
        self.announce(instance, config, &next, &recap).await?;
        Ok(())
    }

    /// Revokes the role from members whose grace period ran out. Gateway
    /// failures are logged and skipped, never retried.
    async fn clear_lapsed(
        &self,
        instance: &Instance,
        config: &SquadConfig,
        schedule: &DeadlineSchedule,
    ) -> Result<(), SquadError> {
        let Some(role_id) = config.role_id() else {
            return Ok(());
        };
        let members = match self.gateway.role_members(role_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(
                    "Listing role members for community {} failed: {}",
                    instance.id(),
                    e
                );
                return Ok(());
            }
        };

        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let reports: Vec<Report> = instance.database.select()?.collect();
        let now = Utc::now();
        for member in members {
            let standing = stats::participation(schedule, &deadlines, &reports, member);
            let lapsed = standing.role_expires.is_none_or(|at| at <= now);
            if !lapsed {
                continue;
            }
            info!(
                "Member {} lapsed in community {}, revoking role",
                member,
                instance.id()
            );
            if let Err(e) = self.gateway.revoke_role(member, role_id).await {
                warn!("Role revoke for member {} failed: {}", member, e);
            }
        }
        Ok(())
    }

    /// Posts and pins the reset notice, unpinning the one for the period
    /// that just closed. Chat failures are logged; the reset itself already
    /// happened.
    async fn announce(
        &self,
        instance: &Instance,
        config: &SquadConfig,
        next: &Deadline,
        recap: &ResetRecap,
    ) -> Result<(), SquadError> {
        let Some(channel_id) = config.channel_id() else {
            return Ok(());
        };
        let notice = ResetNotice {
            channel_id,
            headline: "A new week has started".to_string(),
            body: recap.compose(next.instant),
        };

        let message_id = match self.gateway.post_reset_notice(&notice).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "Reset notice for community {} failed: {}",
                    instance.id(),
                    e
                );
                return Ok(());
            }
        };

        let pinned: Vec<PinnedNotice> = instance.database.select()?.collect();
        for old in pinned.iter().filter(|p| Some(p.deadline_id) == recap.closed_id) {
            if let Err(e) = self.gateway.unpin_message(channel_id, old.message_id).await {
                warn!("Unpinning message {} failed: {}", old.message_id, e);
            }
        }
        if let Err(e) = self.gateway.pin_message(channel_id, message_id).await {
            warn!("Pinning message {} failed: {}", message_id, e);
        }
        instance.database.insert(&PinnedNotice {
            id: Uuid::new_v4(),
            deadline_id: next.id,
            message_id,
        })?;
        Ok(())
    }

    /// Full history as an ordered bucket document.
    pub fn export_history(&self, instance: &Instance) -> Result<DataExport, SquadError> {
        let mut deadlines: Vec<Deadline> = instance.database.select()?.collect();
        deadlines.sort_by_key(|d| d.instant);
        let reports: Vec<Report> = instance.database.select()?.collect();

        let buckets = deadlines
            .iter()
            .map(|deadline| ExportBucket {
                deadline: deadline.instant,
                reports: reports
                    .iter()
                    .filter(|r| r.deadline_id == deadline.id)
                    .map(|r| ExportItem {
                        member_id: r.member_id,
                        message_id: r.message_id,
                        instant: r.instant,
                    })
                    .collect(),
            })
            .collect();
        Ok(DataExport { buckets })
    }

    /// Merges an export document into the store. Buckets inside the grace
    /// window of the pending deadline are withheld and counted, since the
    /// Approval Gate owns that period live; known messages are not
    /// duplicated.
    pub fn import_history(
        &self,
        instance: &Instance,
        export: &DataExport,
    ) -> Result<ImportSummary, SquadError> {
        let existing_deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let existing_reports: Vec<Report> = instance.database.select()?.collect();
        // only a deadline still ahead of us guards its grace window; history
        // that predates every known deadline merges freely
        let now = Utc::now();
        let pending = existing_deadlines
            .iter()
            .map(|d| d.instant)
            .max()
            .filter(|i| *i > now);

        let mut summary = ImportSummary::default();
        for bucket in &export.buckets {
            if let Some(pending) = pending {
                if pending - bucket.deadline < grace_window() {
                    summary.skipped_recent += 1;
                    continue;
                }
            }

            let deadline_id = match existing_deadlines
                .iter()
                .find(|d| d.instant == bucket.deadline)
            {
                Some(existing) => existing.id,
                None => {
                    let deadline = Deadline::at(bucket.deadline);
                    instance.database.insert(&deadline)?;
                    summary.deadlines_added += 1;
                    deadline.id
                }
            };

            for item in &bucket.reports {
                let known = existing_reports
                    .iter()
                    .any(|r| r.message_id == item.message_id && r.member_id == item.member_id);
                if known {
                    continue;
                }
                instance.database.insert(&Report {
                    id: Uuid::new_v4(),
                    member_id: item.member_id,
                    message_id: item.message_id,
                    instant: item.instant,
                    deadline_id,
                })?;
                summary.reports_added += 1;
            }
        }
        info!(
            "Import for community {}: {} deadlines, {} reports, {} buckets withheld",
            instance.id(),
            summary.deadlines_added,
            summary.reports_added,
            summary.skipped_recent
        );
        Ok(summary)
    }

    /// Reconstructs history by scraping the squad channel and bucketing its
    /// messages per deadline, then merges the result like an import.
    pub async fn rebuild_from_channel(
        &self,
        instance: &Instance,
    ) -> Result<ImportSummary, SquadError> {
        let config = instance.config.read().clone();
        let Some(channel_id) = config.channel_id() else {
            return Err(SquadError::NotConfigured);
        };
        let schedule = self.schedule_for(&config)?;

        let messages = self
            .gateway
            .read_channel_history(channel_id, DateTime::UNIX_EPOCH)
            .await?;
        let buckets = bucket_history(&schedule, &messages)?;
        let export = DataExport {
            buckets: buckets
                .into_iter()
                .map(|bucket| ExportBucket {
                    deadline: bucket.deadline,
                    reports: bucket
                        .entries
                        .into_iter()
                        .map(|entry| ExportItem {
                            member_id: entry.member_id,
                            message_id: entry.message_id,
                            instant: entry.instant,
                        })
                        .collect(),
                })
                .collect(),
        };
        self.import_history(instance, &export)
    }

    /// Makes sure a future deadline row exists, inserting the schedule's
    /// next occurrence when the latest known one has already passed.
    fn establish_next_deadline(
        &self,
        instance: &Instance,
        schedule: &DeadlineSchedule,
    ) -> Result<DateTime<Utc>, SquadError> {
        let deadlines: Vec<Deadline> = instance.database.select()?.collect();
        let now = Utc::now();
        if let Some(pending) = deadlines.iter().map(|d| d.instant).max().filter(|i| *i > now) {
            return Ok(pending);
        }

        let next_instant = schedule
            .instants(None)
            .next()
            .ok_or(SquadError::DeadlineGeneration)?;
        instance.database.insert(&Deadline::at(next_instant))?;
        Ok(next_instant)
    }
}
