use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, ValueEnum};
use const_format::concatcp;
use rand::seq::SliceRandom;
use reqwest::{
    blocking::{Client, Response},
    StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::fs::File;
use std::io::Write;
use std::ops::{AddAssign, Div};
use std::process::{self, Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration as StdDuration, Instant};
use tempfile::NamedTempFile;

const LOCAL_PORT: u32 = 8374;
const LOCAL_URL: &str = concatcp!("http://127.0.0.1:", LOCAL_PORT);

#[rustfmt::skip]
const ROCKET_ENV: &[(&str, &str)] = &[
    ("ROCKET_PORT", concatcp!(LOCAL_PORT)),
    ("ROCKET_JWT_SECRET", "dummy"),
    ("ROCKET_AUTH_TTL", "3600"),
    ("ROCKET_STORE", "memory"),
];

const ADMIN_ID: &str = "BENCHADMIN";

#[rustfmt::skip]
const CANDIDATES: &[(&str, &str, &str)] = &[
    ("C1", "Abrar", "ಅಬ್ರಾರ್"),
    ("C2", "Dishanth", "ದಿಶಾಂತ್"),
    ("C3", "Grace", "ಗ್ರೇಸ್"),
    ("C4", "Henry", "ಹೆನ್ರಿ"),
];

#[derive(Parser)]
struct Args {
    /// Silence local server logging.
    #[arg(short, long)]
    quiet: bool,

    /// Send local server logging to this file; takes precedence over --quiet.
    #[arg(long)]
    logfile: Option<String>,

    /// Connect to a remote server at this URL instead of running a local one.
    /// The remote roster must contain voters `V000000` upwards and the admin.
    #[arg(long)]
    remote: Option<String>,

    /// How many threads to use. Defaults to the number of logical CPUs.
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// How many voters each thread logs in and votes for.
    #[arg(long, default_value_t = 100)]
    voters_per_thread: usize,

    /// How voters behave when casting.
    #[arg(long, value_enum, default_value_t)]
    cast_mode: CastMode,

    /// Check the admin turnout figures against the accepted ballots afterwards.
    #[arg(long)]
    verify: bool,
}

/// How voters behave when casting.
#[derive(Debug, Copy, Clone, ValueEnum)]
enum CastMode {
    /// Cast exactly once.
    Once,
    /// Fire two casts for different candidates at the same time.
    Duplicate,
    /// Attempt to model real behaviour: double-submit with 5% probability.
    Realistic,
}

impl CastMode {
    /// How many simultaneous casts to send for one voter.
    fn attempts(&self) -> usize {
        match self {
            Self::Once => 1,
            Self::Duplicate => 2,
            Self::Realistic => {
                if rand::random::<f32>() < 0.05 {
                    2
                } else {
                    1
                }
            }
        }
    }
}

impl Default for CastMode {
    fn default() -> Self {
        Self::Realistic
    }
}

/// Construct a URL from segments.
macro_rules! url {
    ($($segment:expr),+) => {{
        std::path::PathBuf::from_iter([$($segment),+]).to_str().unwrap()
    }}
}

fn voter_id(n: usize) -> String {
    format!("V{n:06}")
}

/// Write a roster with `num_voters` numbered voters plus the admin.
fn write_roster(num_voters: usize) -> anyhow::Result<NamedTempFile> {
    let mut voters: Vec<_> = (0..num_voters)
        .map(|n| json!({ "voter_id": voter_id(n), "name": format!("Voter {n}") }))
        .collect();
    voters.push(json!({ "voter_id": ADMIN_ID, "name": "Benchmark Admin", "is_admin": true }));
    let candidates: Vec<_> = CANDIDATES
        .iter()
        .map(|(id, name, localized)| {
            json!({ "candidate_id": id, "display_name": name, "localized_name": localized })
        })
        .collect();

    let mut f = NamedTempFile::new()?;
    serde_json::to_writer(&mut f, &json!({ "voters": voters, "candidates": candidates }))?;
    f.flush()?;
    Ok(f)
}

/// Set up everything we need before starting the server.
fn setup_deps(roster: &NamedTempFile) -> anyhow::Result<()> {
    // Ensure the optimised build is up-to-date.
    Command::new("cargo")
        .args(["build", "--release", "--bin", "election-backend"])
        .status()?
        .success()
        .then_some(())
        .ok_or_else(|| anyhow!("server build exited nonzero"))?;

    // Open the window now, with plenty of time to run.
    let starts_at = Utc::now() - Duration::minutes(1);
    let ends_at = starts_at + Duration::hours(2);
    env::set_var("ROCKET_STARTS_AT", starts_at.to_rfc3339());
    env::set_var("ROCKET_ENDS_AT", ends_at.to_rfc3339());
    env::set_var(
        "ROCKET_ROSTER",
        roster
            .path()
            .to_str()
            .ok_or_else(|| anyhow!("roster path is not UTF-8"))?,
    );

    // Set other environment variables.
    for (var, val) in ROCKET_ENV {
        env::set_var(var, val);
    }

    Ok(())
}

/// Terminate the given child process. This is a SIGTERM on unix and a hard-kill on other
/// platforms.
fn terminate_child(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM)?;
    }
    #[cfg(not(unix))]
    {
        child.kill()?;
    }
    Ok(())
}

/// Start the local server and wait until it answers.
fn launch_server(logfile: Stdio) -> anyhow::Result<Child> {
    let mut proc = Command::new("./target/release/election-backend")
        .stdout(logfile)
        .spawn()?;

    // Wait for the server to be reachable.
    let client = Client::new();
    loop {
        if let Ok(phase) = get_phase(&client, LOCAL_URL) {
            if phase.phase == "active" {
                break;
            }
            terminate_child(&mut proc)?;
            proc.wait()?;
            return Err(anyhow!("Server started in phase {}", phase.phase));
        }

        // Check the server didn't exit.
        if let Some(retcode) = proc.try_wait()? {
            return Err(anyhow!("Server exited prematurely with code {}", retcode));
        }
        thread::sleep(StdDuration::from_millis(50));
    }

    Ok(proc)
}

#[derive(Debug, Deserialize)]
struct PhaseDesc {
    phase: String,
    now: DateTime<Utc>,
}

fn get_phase(client: &Client, url: &str) -> anyhow::Result<PhaseDesc> {
    Ok(client
        .get(url!(url, "phase"))
        .send()
        .and_then(Response::error_for_status)?
        .json()?)
}

/// Log in and return the client with embedded auth cookies.
fn login(url: &str, voter_id: &str) -> anyhow::Result<(Client, StdDuration)> {
    let client = Client::builder().cookie_store(true).build()?;
    let start = Instant::now();

    client
        .post(url!(url, "auth/login"))
        .json(&json!({ "voter_id": voter_id }))
        .send()
        .and_then(Response::error_for_status)?;

    Ok((client, start.elapsed()))
}

/// Durations of each part of the voting process.
#[derive(Debug, Default)]
struct VoteTimings {
    cast: StdDuration,
    refresh: StdDuration,
}

impl AddAssign for VoteTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.cast += rhs.cast;
        self.refresh += rhs.refresh;
    }
}

impl Div<u32> for VoteTimings {
    type Output = Self;

    fn div(self, rhs: u32) -> Self {
        Self {
            cast: self.cast / rhs,
            refresh: self.refresh / rhs,
        }
    }
}

#[derive(Deserialize)]
struct CastReceipt {
    refresh_after_ms: u64,
}

/// Outcome of one voter's casts.
#[derive(Debug, Default)]
struct CastTally {
    accepted: usize,
    conflicts: usize,
}

/// Cast `attempts` simultaneous ballots for different candidates, then
/// re-read the candidate list after the advised delay. The `client` must be
/// pre-authenticated.
fn cast_vote(url: &str, client: &Client, attempts: usize) -> anyhow::Result<(CastTally, VoteTimings)> {
    let mut candidates: Vec<_> = CANDIDATES.iter().map(|(id, _, _)| *id).collect();
    candidates.shuffle(&mut rand::thread_rng());

    let pre_cast = Instant::now();
    let responses = thread::scope(|s| {
        let handles: Vec<_> = candidates
            .iter()
            .cycle()
            .take(attempts)
            .map(|candidate| {
                s.spawn(move || {
                    client
                        .post(url!(url, "votes"))
                        .json(&json!({ "candidate_id": candidate }))
                        .send()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;
    let post_cast = Instant::now();

    let mut tally = CastTally::default();
    let mut refresh_after = StdDuration::ZERO;
    for response in responses {
        match response.status() {
            StatusCode::OK => {
                tally.accepted += 1;
                let receipt: CastReceipt = response.json()?;
                refresh_after = StdDuration::from_millis(receipt.refresh_after_ms);
            }
            StatusCode::CONFLICT => tally.conflicts += 1,
            status => return Err(anyhow!("cast failed with {status}: {:?}", response.text())),
        }
    }
    if tally.accepted != 1 {
        return Err(anyhow!("{} of {attempts} casts were accepted", tally.accepted));
    }

    // Honour the advised delay before reading tallies again.
    thread::sleep(refresh_after);
    let pre_refresh = Instant::now();
    client
        .get(url!(url, "candidates"))
        .send()
        .and_then(Response::error_for_status)?;
    let post_refresh = Instant::now();

    Ok((
        tally,
        VoteTimings {
            cast: post_cast.duration_since(pre_cast),
            refresh: post_refresh.duration_since(pre_refresh),
        },
    ))
}

/// Poll the phase once a second until voting opens.
fn wait_until_open(url: &str) -> anyhow::Result<()> {
    let client = Client::new();
    loop {
        let phase = get_phase(&client, url)?;
        match phase.phase.as_str() {
            "active" => return Ok(()),
            "waiting" => {
                println!("waiting for voting to open ({})", phase.now);
                thread::sleep(StdDuration::from_secs(1));
            }
            other => return Err(anyhow!("voting is {other}, nothing to benchmark")),
        }
    }
}

/// Poll the phase once a second until `done` is set, failing if voting closes.
fn watch_phase(url: &str, done: &AtomicBool) -> anyhow::Result<()> {
    let client = Client::new();
    while !done.load(Ordering::Relaxed) {
        let phase = get_phase(&client, url)?;
        if phase.phase != "active" {
            return Err(anyhow!("voting is {} as of {}", phase.phase, phase.now));
        }
        thread::sleep(StdDuration::from_secs(1));
    }
    Ok(())
}

/// Run the benchmark, returning the number of accepted ballots.
fn benchmark(
    url: &str,
    num_threads: usize,
    voters_per_thread: usize,
    cast_mode: CastMode,
) -> anyhow::Result<usize> {
    let end_val: usize = num_threads * voters_per_thread;
    let done = AtomicBool::new(false);

    let start = Instant::now();
    thread::scope(|s| {
        let watcher = s.spawn(|| watch_phase(url, &done));
        let mut threads = Vec::with_capacity(num_threads);

        for start in (0..end_val).step_by(voters_per_thread) {
            let t = s.spawn(move || {
                let mut auth_duration = StdDuration::ZERO;
                let mut vote_duration = VoteTimings::default();
                let mut tally = CastTally::default();

                for n in start..(start + voters_per_thread) {
                    let (client, auth_dur) = login(url, &voter_id(n))?;
                    let (cast_tally, vote_dur) = cast_vote(url, &client, cast_mode.attempts())?;

                    auth_duration += auth_dur;
                    vote_duration += vote_dur;
                    tally.accepted += cast_tally.accepted;
                    tally.conflicts += cast_tally.conflicts;
                }

                let avg_auth_dur = auth_duration / voters_per_thread as u32;
                let avg_vote_dur = vote_duration / voters_per_thread as u32;
                Ok::<_, anyhow::Error>((avg_auth_dur, avg_vote_dur, tally))
            });
            threads.push(t);
        }

        let mut auth_duration = StdDuration::ZERO;
        let mut vote_duration = VoteTimings::default();
        let mut tally = CastTally::default();
        let mut result = Ok(());
        for t in threads {
            match t.join().expect("thread panicked") {
                Ok((auth_dur, vote_dur, thread_tally)) => {
                    auth_duration += auth_dur;
                    vote_duration += vote_dur;
                    tally.accepted += thread_tally.accepted;
                    tally.conflicts += thread_tally.conflicts;
                }
                Err(e) => result = Err(e),
            }
        }
        let total_duration = start.elapsed();
        done.store(true, Ordering::Relaxed);
        watcher.join().expect("watcher panicked")?;
        result?;

        let avg_auth_duration = auth_duration / num_threads as u32;
        let avg_vote_duration = vote_duration / num_threads as u32;
        let avg_total_duration = avg_auth_duration + avg_vote_duration.cast;

        // Theoretical votes per sec is 1/avg_duration * num_threads.
        let votes_per_sec = num_threads as f64 / avg_total_duration.as_secs_f64();
        // Actual votes per sec is total_votes / total_time, and includes the refresh delay.
        let actual_votes_per_sec = end_val as f64 / total_duration.as_secs_f64();

        println!("auth: {:?}", avg_auth_duration);
        println!("cast: {:?}", avg_vote_duration.cast);
        println!("read: {:?}", avg_vote_duration.refresh);
        println!("duplicate casts rejected: {}", tally.conflicts);

        println!("\ntotal: {:?} ({:.2}/s)", avg_total_duration, votes_per_sec);
        println!(
            "actual duration: {} votes in {:?} ({:.2}/s)",
            end_val, total_duration, actual_votes_per_sec
        );

        Ok(tally.accepted)
    })
}

#[derive(Debug, Deserialize)]
struct Turnout {
    voters_voted: u64,
    votes_cast: u64,
}

/// Return `Ok(())` if the admin turnout agrees with what the benchmark saw.
fn verify(url: &str, accepted: usize, fresh: bool) -> anyhow::Result<()> {
    let (client, _) = login(url, ADMIN_ID)?;
    let turnout: Turnout = client
        .get(url!(url, "admin/turnout"))
        .send()
        .and_then(Response::error_for_status)?
        .json()?;

    if turnout.votes_cast != turnout.voters_voted {
        return Err(anyhow!(
            "{} votes cast by {} voters",
            turnout.votes_cast,
            turnout.voters_voted
        ));
    }
    // A remote server may carry votes from earlier runs.
    if fresh && turnout.votes_cast != accepted as u64 {
        return Err(anyhow!(
            "{} votes recorded but {} accepted",
            turnout.votes_cast,
            accepted
        ));
    }
    println!("verified: {} votes from {} voters", turnout.votes_cast, turnout.voters_voted);

    Ok(())
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let url = args.remote.as_deref().unwrap_or(LOCAL_URL);

    // If we're not connecting remotely, bring up a local server.
    let mut proc: Option<Child> = None;
    let mut _roster = None;
    if args.remote.is_none() {
        let roster = write_roster(args.threads * args.voters_per_thread)?;
        setup_deps(&roster)?;
        _roster = Some(roster);
        let logfile = match args.logfile {
            Some(path) => Stdio::from(File::create(path)?),
            None => {
                if args.quiet {
                    Stdio::null()
                } else {
                    Stdio::inherit()
                }
            }
        };
        proc = Some(launch_server(logfile)?);
    }

    // Use a closure to ensure the cleanup below runs.
    let result = (|| {
        wait_until_open(url)?;
        let accepted = benchmark(url, args.threads, args.voters_per_thread, args.cast_mode)?;

        // Verify if requested.
        if args.verify {
            verify(url, accepted, args.remote.is_none())?;
        }

        Ok(())
    })();

    // Kill the server.
    if let Some(p) = proc.as_mut() {
        terminate_child(p)?;
        p.wait()?;
    }

    result
}

fn main() {
    if let Err(e) = run() {
        eprintln!("FATAL: {}", e);
        process::exit(1);
    }
}
