//! 内存存储
//!
//! 与 PostgreSQL 实现保持相同的约束：唯一键、选票版本检查、
//! 审计链头条件写入。用于测试与 `memory://` 演示模式。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    audit::{AuditFilters, AuditLog, AuditSummary, EntityType, NewAuditEntry},
    ballot::{Ballot, BallotFilters},
    candidate::{Candidate, CandidateFilters},
    position::{Position, PositionFilters},
    user::User,
    voter::{Voter, VoterFilters, VoterStats, VoterStatus},
};
use crate::repository::{
    candidate_repo::DUPLICATE_NATIONAL_ID, position_repo::DUPLICATE_POSITION_CODE,
    user_repo::DUPLICATE_USER, voter_repo::DUPLICATE_VOTER, AppendOutcome, AuditRepository,
    BallotRepository, CandidateRepository, PositionRepository, UserRepository, VoterRepository,
};

#[derive(Default)]
struct AuditTable {
    entries: Vec<AuditLog>,
    next_sequence: i64,
}

impl AuditTable {
    fn head(&self) -> Option<&AuditLog> {
        self.entries
            .iter()
            .max_by(|a, b| (a.timestamp, a.sequence).cmp(&(b.timestamp, b.sequence)))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    candidates: RwLock<HashMap<Uuid, Candidate>>,
    ballots: RwLock<HashMap<Uuid, Ballot>>,
    positions: RwLock<HashMap<Uuid, Position>>,
    users: RwLock<HashMap<Uuid, User>>,
    voters: RwLock<HashMap<Uuid, Voter>>,
    audit: RwLock<AuditTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接改写存储中的描述，绕过服务层（篡改检测测试用）
    #[cfg(test)]
    pub(crate) fn overwrite_audit_description(&self, id: Uuid, description: &str) -> bool {
        let mut audit = self.audit.write();
        match audit.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.description = description.to_string();
                true
            }
            None => false,
        }
    }
}

/// 过滤、按 key 倒序、分页
fn page<T: Clone, K: Ord>(
    items: impl Iterator<Item = T>,
    sort_key: impl Fn(&T) -> K,
    limit: i64,
    offset: i64,
) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl CandidateRepository for MemoryStore {
    async fn insert(&self, candidate: &Candidate) -> Result<Candidate> {
        let mut table = self.candidates.write();
        if table.values().any(|c| c.national_id == candidate.national_id) {
            return Err(AppError::bad_request(DUPLICATE_NATIONAL_ID));
        }
        table.insert(candidate.id, candidate.clone());
        Ok(candidate.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Candidate>> {
        Ok(self.candidates.read().get(&id).cloned())
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Candidate>> {
        Ok(self
            .candidates
            .read()
            .values()
            .find(|c| c.national_id == national_id)
            .cloned())
    }

    async fn list(
        &self,
        filters: &CandidateFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Candidate>> {
        let table = self.candidates.read();
        Ok(page(
            table.values().filter(|c| filters.matches(c)).cloned(),
            |c| (c.created_at, c.id),
            limit,
            offset,
        ))
    }

    async fn count(&self, filters: &CandidateFilters) -> Result<i64> {
        Ok(self.candidates.read().values().filter(|c| filters.matches(c)).count() as i64)
    }

    async fn update(&self, candidate: &Candidate) -> Result<Option<Candidate>> {
        let mut table = self.candidates.write();
        match table.get_mut(&candidate.id) {
            Some(stored) => {
                *stored = candidate.clone();
                Ok(Some(candidate.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.candidates.write().remove(&id).is_some())
    }

    async fn count_by_position(&self, position_id: Uuid) -> Result<i64> {
        Ok(self
            .candidates
            .read()
            .values()
            .filter(|c| c.position_id == position_id)
            .count() as i64)
    }
}

#[async_trait]
impl BallotRepository for MemoryStore {
    async fn insert(&self, ballot: &Ballot) -> Result<Ballot> {
        self.ballots.write().insert(ballot.id, ballot.clone());
        Ok(ballot.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ballot>> {
        Ok(self.ballots.read().get(&id).cloned())
    }

    async fn list(&self, filters: &BallotFilters, limit: i64, offset: i64) -> Result<Vec<Ballot>> {
        let table = self.ballots.read();
        Ok(page(
            table.values().filter(|b| filters.matches(b)).cloned(),
            |b| (b.created_at, b.id),
            limit,
            offset,
        ))
    }

    async fn count(&self, filters: &BallotFilters) -> Result<i64> {
        Ok(self.ballots.read().values().filter(|b| filters.matches(b)).count() as i64)
    }

    async fn update(&self, ballot: &Ballot, expected_version: i32) -> Result<Option<Ballot>> {
        let mut table = self.ballots.write();
        match table.get_mut(&ballot.id) {
            Some(stored) if stored.version == expected_version => {
                let mut updated = ballot.clone();
                updated.version = expected_version + 1;
                *stored = updated.clone();
                Ok(Some(updated))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.ballots.write().remove(&id).is_some())
    }

    async fn references_candidate(&self, candidate_id: Uuid) -> Result<bool> {
        Ok(self
            .ballots
            .read()
            .values()
            .any(|b| b.candidates.iter().any(|e| e.candidate_id == candidate_id)))
    }

    async fn count_by_position(&self, position_id: Uuid) -> Result<i64> {
        Ok(self
            .ballots
            .read()
            .values()
            .filter(|b| b.position_id == position_id)
            .count() as i64)
    }
}

#[async_trait]
impl PositionRepository for MemoryStore {
    async fn insert(&self, position: &Position) -> Result<Position> {
        let mut table = self.positions.write();
        if table.values().any(|p| p.code == position.code) {
            return Err(AppError::bad_request(DUPLICATE_POSITION_CODE));
        }
        table.insert(position.id, position.clone());
        Ok(position.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Position>> {
        Ok(self.positions.read().get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Position>> {
        Ok(self.positions.read().values().find(|p| p.code == code).cloned())
    }

    async fn list(&self, filters: &PositionFilters) -> Result<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .values()
            .filter(|p| filters.matches(p))
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.title.cmp(&b.title)));
        Ok(positions)
    }

    async fn update(&self, position: &Position) -> Result<Option<Position>> {
        let mut table = self.positions.write();
        match table.get_mut(&position.id) {
            Some(stored) => {
                *stored = position.clone();
                Ok(Some(position.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.positions.write().remove(&id).is_some())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<User> {
        let mut table = self.users.write();
        let taken = table.values().any(|u| {
            u.username.eq_ignore_ascii_case(&user.username)
                || u.email.eq_ignore_ascii_case(&user.email)
        });
        if taken {
            return Err(AppError::bad_request(DUPLICATE_USER));
        }
        table.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(login) || u.email.eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn update_last_login(&self, id: Uuid, at: Option<DateTime<Utc>>) -> Result<()> {
        if let Some(user) = self.users.write().get_mut(&id) {
            user.last_login = at;
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.users.read().len() as i64)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().remove(&id).is_some())
    }
}

#[async_trait]
impl VoterRepository for MemoryStore {
    async fn insert(&self, voter: &Voter) -> Result<Voter> {
        let mut table = self.voters.write();
        let taken = table.values().any(|v| {
            v.national_id == voter.national_id
                || v.registration_number == voter.registration_number
        });
        if taken {
            return Err(AppError::bad_request(DUPLICATE_VOTER));
        }
        table.insert(voter.id, voter.clone());
        Ok(voter.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Voter>> {
        Ok(self.voters.read().get(&id).cloned())
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Voter>> {
        Ok(self
            .voters
            .read()
            .values()
            .find(|v| v.national_id == national_id)
            .cloned())
    }

    async fn list(&self, filters: &VoterFilters, limit: i64, offset: i64) -> Result<Vec<Voter>> {
        let table = self.voters.read();
        Ok(page(
            table.values().filter(|v| filters.matches(v)).cloned(),
            |v| (v.created_at, v.id),
            limit,
            offset,
        ))
    }

    async fn count(&self, filters: &VoterFilters) -> Result<i64> {
        Ok(self.voters.read().values().filter(|v| filters.matches(v)).count() as i64)
    }

    async fn update(&self, voter: &Voter) -> Result<Option<Voter>> {
        let mut table = self.voters.write();
        match table.get_mut(&voter.id) {
            Some(stored) => {
                *stored = voter.clone();
                Ok(Some(voter.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_voted(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Voter>> {
        let mut table = self.voters.write();
        match table.get_mut(&id) {
            Some(voter) if voter.status == VoterStatus::Verified && !voter.has_voted => {
                voter.has_voted = true;
                voter.voted_at = Some(at);
                voter.updated_at = at;
                Ok(Some(voter.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.voters.write().remove(&id).is_some())
    }

    async fn stats(&self, filters: &VoterFilters) -> Result<VoterStats> {
        let table = self.voters.read();
        let (mut registered, mut verified, mut suspended, mut voted) = (0, 0, 0, 0);
        for voter in table.values().filter(|v| filters.matches(v)) {
            match voter.status {
                VoterStatus::Registered => registered += 1,
                VoterStatus::Verified => verified += 1,
                VoterStatus::Suspended => suspended += 1,
            }
            if voter.has_voted {
                voted += 1;
            }
        }
        Ok(VoterStats::new(registered, verified, suspended, voted))
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn head(&self) -> Result<Option<AuditLog>> {
        Ok(self.audit.read().head().cloned())
    }

    async fn append(
        &self,
        entry: &NewAuditEntry,
        expected_head: Option<Uuid>,
    ) -> Result<AppendOutcome> {
        let mut audit = self.audit.write();
        if audit.head().map(|h| h.id) != expected_head {
            return Ok(AppendOutcome::Conflict);
        }

        audit.next_sequence += 1;
        let log = AuditLog::from_new(entry.clone(), audit.next_sequence);
        audit.entries.push(log.clone());
        Ok(AppendOutcome::Appended(log))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuditLog>> {
        Ok(self.audit.read().entries.iter().find(|e| e.id == id).cloned())
    }

    async fn query(&self, filters: &AuditFilters, limit: i64, offset: i64) -> Result<Vec<AuditLog>> {
        let audit = self.audit.read();
        Ok(page(
            audit.entries.iter().filter(|e| filters.matches(e)).cloned(),
            |e| (e.timestamp, e.sequence),
            limit,
            offset,
        ))
    }

    async fn count(&self, filters: &AuditFilters) -> Result<i64> {
        Ok(self
            .audit
            .read()
            .entries
            .iter()
            .filter(|e| filters.matches(e))
            .count() as i64)
    }

    async fn trail(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditLog>> {
        let mut logs: Vec<AuditLog> = self
            .audit
            .read()
            .entries
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == Some(entity_id))
            .cloned()
            .collect();
        logs.sort_by_key(|e| (e.timestamp, e.sequence));
        Ok(logs)
    }

    async fn chain(&self) -> Result<Vec<AuditLog>> {
        let mut logs = self.audit.read().entries.clone();
        logs.sort_by_key(|e| (e.timestamp, e.sequence));
        Ok(logs)
    }

    async fn mark_tampered(&self, ids: &[Uuid]) -> Result<u64> {
        let mut audit = self.audit.write();
        let mut flagged = 0;
        for entry in audit.entries.iter_mut() {
            if ids.contains(&entry.id) && !entry.is_tampered {
                entry.is_tampered = true;
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    async fn summarize(&self, filters: &AuditFilters) -> Result<AuditSummary> {
        let audit = self.audit.read();
        let mut summary = AuditSummary::from_logs(audit.entries.iter().filter(|e| filters.matches(e)));
        summary.start_date = filters.start_date;
        summary.end_date = filters.end_date;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::{AuditAction, AuditCategory, AuditChanges, RequestInfo, Severity};
    use serde_json::json;

    fn new_entry(ts: DateTime<Utc>) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::new_v4(),
            action: AuditAction::UserLogin,
            entity_type: EntityType::User,
            entity_id: None,
            performed_by: Uuid::new_v4(),
            description: "login".to_string(),
            details: json!({}),
            changes: AuditChanges::default(),
            request_info: RequestInfo::default(),
            severity: Severity::Low,
            category: AuditCategory::Authentication,
            timestamp: ts,
            hash: "h".to_string(),
            previous_hash: None,
        }
    }

    #[tokio::test]
    async fn test_append_rejects_stale_head() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = match store.append(&new_entry(now), None).await.unwrap() {
            AppendOutcome::Appended(log) => log,
            AppendOutcome::Conflict => panic!("first append must succeed"),
        };
        assert_eq!(first.sequence, 1);

        // 链头已经是 first，再以空链头写入应冲突
        let outcome = store.append(&new_entry(now), None).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Conflict);

        let outcome = store.append(&new_entry(now), Some(first.id)).await.unwrap();
        assert!(matches!(outcome, AppendOutcome::Appended(ref log) if log.sequence == 2));
        assert_eq!(AuditRepository::count(&store, &AuditFilters::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_head_breaks_timestamp_ties_by_sequence() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append(&new_entry(now), None).await.unwrap();
        let head = store.head().await.unwrap().unwrap();
        let second = new_entry(now);
        store.append(&second, Some(head.id)).await.unwrap();

        assert_eq!(store.head().await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_mark_tampered_counts_only_new_flags() {
        let store = MemoryStore::new();
        let entry = new_entry(Utc::now());
        store.append(&entry, None).await.unwrap();

        assert_eq!(store.mark_tampered(&[entry.id]).await.unwrap(), 1);
        assert_eq!(store.mark_tampered(&[entry.id]).await.unwrap(), 0);
        let stored = AuditRepository::find_by_id(&store, entry.id).await.unwrap().unwrap();
        assert!(stored.is_tampered);
    }
}
