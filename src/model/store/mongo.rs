use std::ops::Deref;
use std::time::Duration as StdDuration;

use mongodb::{
    bson::{doc, Document},
    error::{Error as DbError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{
        Acknowledgment, ClientOptions, FindOptions, IndexOptions, ReadConcern, SessionOptions,
        TransactionOptions, UpdateOptions, WriteConcern,
    },
    Client, ClientSession, Collection, Database, IndexModel,
};
use rand::Rng;
use rocket::{futures::TryStreamExt, tokio::time::sleep};

use crate::model::{
    common::{CandidateId, Rejection, VoterId},
    db::{Candidate, Roster, Voter},
};

use super::{
    sort_for_ballot, CandidateFilter, CastOutcome, StoreError, StoreResult, TallySnapshot,
    VoteStore,
};

/// How many times a conflicting cast transaction is re-run before giving up.
const MAX_CAST_ATTEMPTS: u32 = 8;

/// Pause between conflicting cast attempts grows by this much each time.
const CAST_BACKOFF_STEP: StdDuration = StdDuration::from_millis(5);

/// Upper bound of the random extra pause, in milliseconds.
const CAST_BACKOFF_JITTER_MS: u64 = 10;

/// How long to wait after the given failed attempt. The jitter keeps casts
/// that collided once from colliding again in lockstep.
fn cast_backoff(attempt: u32) -> StdDuration {
    let jitter = rand::thread_rng().gen_range(0..=CAST_BACKOFF_JITTER_MS);
    CAST_BACKOFF_STEP * attempt + StdDuration::from_millis(jitter)
}

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Voter {
    const NAME: &'static str = "voters";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    let voter_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Voter>::from_db(db)
        .create_index(voter_index, None)
        .await?;

    let candidate_index = IndexModel::builder()
        .keys(doc! {"candidate_id": 1})
        .options(unique)
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    Ok(())
}

/// A vote store backed by a MongoDB replica set.
///
/// Every cast runs as a multi-document transaction with majority write concern,
/// so a ballot is either fully recorded or not at all.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    voters: Coll<Voter>,
    candidates: Coll<Candidate>,
}

impl MongoStore {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            voters: Coll::from_db(db),
            candidates: Coll::from_db(db),
        }
    }

    /// Connect to the given deployment and make sure the indexes exist.
    pub async fn connect(uri: &str, db_name: &str) -> StoreResult<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        Ok(Self::new(client, &db))
    }

    fn transaction_options() -> TransactionOptions {
        TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(
                WriteConcern::builder()
                    .w(Acknowledgment::Majority)
                    .build(),
            )
            .build()
    }

    /// The body of the cast transaction. Any rejection is returned before a
    /// write has happened, or after a write that matched nothing.
    async fn cast_in_transaction(
        &self,
        session: &mut ClientSession,
        voter_id: &VoterId,
        candidate_id: &CandidateId,
    ) -> Result<CastOutcome, DbError> {
        let voter = self
            .voters
            .find_one_with_session(doc! {"voter_id": voter_id}, None, session)
            .await?;
        let Some(voter) = voter else {
            return Ok(CastOutcome::Rejected(Rejection::UnknownVoter));
        };
        if voter.has_voted {
            return Ok(CastOutcome::Rejected(Rejection::AlreadyVoted));
        }

        let candidate = self
            .candidates
            .find_one_with_session(doc! {"candidate_id": candidate_id}, None, session)
            .await?;
        if candidate.is_none() {
            return Ok(CastOutcome::Rejected(Rejection::UnknownCandidate));
        }

        // Re-check the flag as part of the write; a concurrent cast that got
        // here first leaves nothing to modify.
        let marked = self
            .voters
            .update_one_with_session(
                doc! {"voter_id": voter_id, "has_voted": false},
                doc! {"$set": {"has_voted": true}},
                None,
                session,
            )
            .await?;
        if marked.modified_count != 1 {
            return Ok(CastOutcome::Rejected(Rejection::AlreadyVoted));
        }

        let counted = self
            .candidates
            .update_one_with_session(
                doc! {"candidate_id": candidate_id},
                doc! {"$inc": {"vote_count": 1_i64}},
                None,
                session,
            )
            .await?;
        if counted.matched_count != 1 {
            return Ok(CastOutcome::Rejected(Rejection::UnknownCandidate));
        }

        Ok(CastOutcome::Accepted)
    }

    async fn commit_with_retry(session: &mut ClientSession) -> Result<(), DbError> {
        let mut attempt = 1;
        loop {
            match session.commit_transaction().await {
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < MAX_CAST_ATTEMPTS =>
                {
                    debug!("Commit result unknown, retrying (attempt {attempt}): {err}");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn abort(session: &mut ClientSession) {
        if let Err(err) = session.abort_transaction().await {
            debug!("Failed to abort cast transaction: {err}");
        }
    }
}

fn name_filter(filter: &CandidateFilter) -> Document {
    match &filter.name {
        None => doc! {},
        Some(name) => {
            let pattern = escape_regex(name);
            doc! {
                "$or": [
                    {"display_name": {"$regex": pattern.as_str(), "$options": "i"}},
                    {"localized_name": {"$regex": pattern.as_str(), "$options": "i"}},
                ]
            }
        }
    }
}

/// Make user input match literally inside a `$regex`.
fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[rocket::async_trait]
impl VoteStore for MongoStore {
    async fn voter(&self, voter_id: &VoterId) -> StoreResult<Option<Voter>> {
        // Fetch two so that a duplicated ID is noticed rather than guessed at.
        let options = FindOptions::builder().limit(2).build();
        let matches: Vec<Voter> = self
            .voters
            .find(doc! {"voter_id": voter_id}, options)
            .await?
            .try_collect()
            .await?;
        if matches.len() > 1 {
            warn!("Voter ID {voter_id} matches more than one record");
            return Ok(None);
        }
        Ok(matches.into_iter().next())
    }

    async fn candidates(&self, filter: &CandidateFilter) -> StoreResult<Vec<Candidate>> {
        let options = FindOptions::builder()
            .sort(doc! {"display_name": 1, "candidate_id": 1})
            .build();
        let mut candidates: Vec<Candidate> = self
            .candidates
            .find(name_filter(filter), options)
            .await?
            .try_collect()
            .await?;
        // The server collation may differ from byte order.
        sort_for_ballot(&mut candidates);
        Ok(candidates)
    }

    async fn cast_vote(
        &self,
        voter_id: &VoterId,
        candidate_id: &CandidateId,
    ) -> StoreResult<CastOutcome> {
        let mut session = self.client.start_session(None).await?;

        for attempt in 1..=MAX_CAST_ATTEMPTS {
            session
                .start_transaction(Some(Self::transaction_options()))
                .await?;

            let result = match self
                .cast_in_transaction(&mut session, voter_id, candidate_id)
                .await
            {
                Ok(CastOutcome::Accepted) => Self::commit_with_retry(&mut session)
                    .await
                    .map(|()| CastOutcome::Accepted),
                Ok(rejected) => {
                    Self::abort(&mut session).await;
                    return Ok(rejected);
                }
                Err(err) => {
                    Self::abort(&mut session).await;
                    Err(err)
                }
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                    debug!("Cast transaction for {voter_id} conflicted (attempt {attempt}): {err}");
                    if attempt < MAX_CAST_ATTEMPTS {
                        sleep(cast_backoff(attempt)).await;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!("Giving up on cast for {voter_id} after {MAX_CAST_ATTEMPTS} attempts");
        Err(StoreError::Contention(MAX_CAST_ATTEMPTS))
    }

    async fn snapshot(&self) -> StoreResult<TallySnapshot> {
        let session_options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(session_options)).await?;

        let mut candidates = Vec::new();
        let mut cursor = self
            .candidates
            .find_with_session(doc! {}, None, &mut session)
            .await?;
        while let Some(candidate) = cursor.next(&mut session).await {
            candidates.push(candidate?);
        }
        sort_for_ballot(&mut candidates);

        let registered_voters = self
            .voters
            .count_documents_with_session(doc! {}, None, &mut session)
            .await?;
        let voters_voted = self
            .voters
            .count_documents_with_session(doc! {"has_voted": true}, None, &mut session)
            .await?;

        Ok(TallySnapshot {
            candidates,
            registered_voters,
            voters_voted,
        })
    }

    async fn load_roster(&self, roster: &Roster) -> StoreResult<()> {
        let upsert = UpdateOptions::builder().upsert(true).build();

        for voter in &roster.voters {
            self.voters
                .update_one(
                    doc! {"voter_id": &voter.voter_id},
                    doc! {"$setOnInsert": {
                        "voter_id": &voter.voter_id,
                        "name": voter.name.as_str(),
                        "is_admin": voter.is_admin,
                        "has_voted": voter.has_voted,
                    }},
                    upsert.clone(),
                )
                .await?;
        }

        for candidate in &roster.candidates {
            let mut fields = doc! {
                "candidate_id": &candidate.candidate_id,
                "display_name": candidate.display_name.as_str(),
                "localized_name": candidate.localized_name.as_str(),
                "vote_count": candidate.vote_count as i64,
            };
            if let Some(image_ref) = &candidate.image_ref {
                fields.insert("image_ref", image_ref.as_str());
            }
            self.candidates
                .update_one(
                    doc! {"candidate_id": &candidate.candidate_id},
                    doc! {"$setOnInsert": fields},
                    upsert.clone(),
                )
                .await?;
        }

        info!(
            "Roster loaded: {} voters, {} candidates",
            roster.voters.len(),
            roster.candidates.len()
        );
        Ok(())
    }
}
