use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::try_join;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::crypto::token::Credentials;
use crate::error::{AppError, Result};
use crate::models::class::ClassEntry;
use crate::models::exam::ExamOutlineEntry;
use crate::models::score::ClassScoreEntry;
use crate::models::term::{ClassYearTerm, ExamYearTerm};
use crate::schedule::Schedule;
use crate::services::portal::PortalClient;
use crate::services::sso::SsoClient;
use crate::stores::cache::{query_fingerprint, ResponseCache};

/// Record-kind tags baked into cache fingerprints.
const KIND_CLASS: &str = "class";
const KIND_EXAM: &str = "exam";
const KIND_SCORE: &str = "score";

/// The record sets behind one classes + exams feed, in configuration order.
pub struct ClassExamRecords {
    pub classes: Vec<(ClassYearTerm, Vec<ClassEntry>)>,
    pub exams: Vec<(ExamYearTerm, Vec<ExamOutlineEntry>)>,
}

/// Orchestrates one feed build: cache reads first, then at most one portal
/// login shared by every record set that missed, then write-through.
///
/// Builds for the same student and feed kind are single-flighted so a burst
/// of identical subscription refreshes costs one login, not one per request.
pub struct FeedService {
    sso: SsoClient,
    portal: PortalClient,
    cache: Arc<dyn ResponseCache>,
    cache_ttl: Duration,
    schedule: Arc<Schedule>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl FeedService {
    pub fn new(
        sso: SsoClient,
        portal: PortalClient,
        cache: Arc<dyn ResponseCache>,
        cache_ttl: Duration,
        schedule: Arc<Schedule>,
    ) -> Self {
        Self {
            sso,
            portal,
            cache,
            cache_ttl,
            schedule,
            inflight: DashMap::new(),
        }
    }

    /// Collects class timetables and exam outlines for every configured term.
    ///
    /// # Arguments
    /// * `credentials` - The portal credentials recovered from the token
    ///
    /// # Returns
    /// The per-term record sets, cached or freshly scraped.
    pub async fn class_exam_records(&self, credentials: &Credentials) -> Result<ClassExamRecords> {
        let stu_id = credentials.username.as_str();
        let _flight = self.begin_flight(format!("classexam:{stu_id}")).await;

        let mut classes: Vec<(ClassYearTerm, String, Option<Vec<ClassEntry>>)> = Vec::new();
        for item in self.schedule.class_terms() {
            let key = query_fingerprint(KIND_CLASS, stu_id, &item.year, item.term.query_value());
            let cached = self.cached(&key).await;
            classes.push((item.clone(), key, cached));
        }
        let mut exams: Vec<(ExamYearTerm, String, Option<Vec<ExamOutlineEntry>>)> = Vec::new();
        for item in self.schedule.exam_terms() {
            let key = query_fingerprint(KIND_EXAM, stu_id, &item.year, item.term.query_value());
            let cached = self.cached(&key).await;
            exams.push((item.clone(), key, cached));
        }

        let class_misses = classes.iter().filter(|(_, _, slot)| slot.is_none()).count();
        let exam_misses = exams.iter().filter(|(_, _, slot)| slot.is_none()).count();

        if class_misses + exam_misses > 0 {
            info!(
                "🎓 {} class and {} exam record sets not cached, scraping the portal",
                class_misses, exam_misses
            );
            let session = self
                .sso
                .login(&credentials.username, &credentials.password)
                .await?;

            let (fetched_classes, fetched_exams) = try_join(
                async {
                    let mut out = Vec::new();
                    for (item, _, slot) in &classes {
                        if slot.is_none() {
                            out.push(
                                self.portal
                                    .class_timetable(&session, &item.year, item.term, stu_id)
                                    .await?,
                            );
                        }
                    }
                    Ok::<_, AppError>(out)
                },
                async {
                    let mut out = Vec::new();
                    for (item, _, slot) in &exams {
                        if slot.is_none() {
                            out.push(
                                self.portal
                                    .exam_outline(&session, &item.year, item.term, stu_id)
                                    .await?,
                            );
                        }
                    }
                    Ok(out)
                },
            )
            .await?;

            let mut fetched = fetched_classes.into_iter();
            for (_, key, slot) in classes.iter_mut() {
                if slot.is_none() {
                    if let Some(records) = fetched.next() {
                        self.store(key, &records).await;
                        *slot = Some(records);
                    }
                }
            }
            let mut fetched = fetched_exams.into_iter();
            for (_, key, slot) in exams.iter_mut() {
                if slot.is_none() {
                    if let Some(records) = fetched.next() {
                        self.store(key, &records).await;
                        *slot = Some(records);
                    }
                }
            }
        } else {
            debug!("🎯 Every record set served from cache");
        }

        Ok(ClassExamRecords {
            classes: classes
                .into_iter()
                .map(|(item, _, slot)| (item, slot.unwrap_or_default()))
                .collect(),
            exams: exams
                .into_iter()
                .map(|(item, _, slot)| (item, slot.unwrap_or_default()))
                .collect(),
        })
    }

    /// Collects the student's score records, cached or freshly scraped.
    pub async fn score_records(&self, credentials: &Credentials) -> Result<Vec<ClassScoreEntry>> {
        let stu_id = credentials.username.as_str();
        let key = query_fingerprint(KIND_SCORE, stu_id, "", "");
        let _flight = self.begin_flight(format!("score:{stu_id}")).await;

        if let Some(records) = self.cached(&key).await {
            debug!("🎯 Score records served from cache");
            return Ok(records);
        }

        info!("🎓 Score records not cached, scraping the portal");
        let session = self
            .sso
            .login(&credentials.username, &credentials.password)
            .await?;
        let records = self.portal.class_scores(&session, stu_id).await?;
        self.store(&key, &records).await;
        Ok(records)
    }

    /// Verifies a credential pair with a real login followed by a scores
    /// fetch. The CAS POST returning 200 is only probable success, so the
    /// fetch corroborates it; the scraped records warm the score cache.
    pub async fn probe(&self, credentials: &Credentials) -> Result<Vec<ClassScoreEntry>> {
        let session = self
            .sso
            .login(&credentials.username, &credentials.password)
            .await?;
        let records = self
            .portal
            .class_scores(&session, &credentials.username)
            .await?;
        let key = query_fingerprint(KIND_SCORE, &credentials.username, "", "");
        self.store(&key, &records).await;
        Ok(records)
    }

    /// Cache lookup plus JSON decode; a corrupt entry is treated as a miss.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let raw = self.cache.get(key).await?;
        match sonic_rs::from_str(&raw) {
            Ok(records) => Some(records),
            Err(e) => {
                warn!("⚠️ Corrupt cache entry {}, refetching: {}", key, e);
                None
            }
        }
    }

    /// Serializes and caches one record set. Failures degrade to an uncached
    /// response rather than failing the feed.
    async fn store<T: Serialize>(&self, key: &str, records: &[T]) {
        match sonic_rs::to_string(records) {
            Ok(raw) => self.cache.put(key, &raw, self.cache_ttl).await,
            Err(e) => warn!("⚠️ Record set not cacheable: {}", e),
        }
    }

    /// Takes the in-flight slot for `key`, waiting if another build holds it.
    /// Waiters re-check the cache after the leader's write-through, so a
    /// stampede of identical requests costs one scrape.
    async fn begin_flight(&self, key: String) -> FlightGuard<'_> {
        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let permit = lock.lock_owned().await;
        FlightGuard {
            flights: &self.inflight,
            key,
            permit: Some(permit),
        }
    }
}

struct FlightGuard<'a> {
    flights: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        // Drop the slot once nobody else holds or awaits it; the shard lock
        // makes the count check race-free against new entrants.
        self.flights
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
