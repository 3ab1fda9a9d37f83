//! Implements the [Universal Chess Interface](https://backscattering.de/chess/uci/), the
//! protocol spoken by chess GUIs and match runners.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use log::{debug, error, info, warn};
use lazy_static::lazy_static;
use regex::Regex;
use chess::Board;
use chess::game::GameState;
use chess::movegen;
use crate::engine::{Engine, Options, SearchBudget};
use crate::engine::cache::DEFAULT_CAPACITY;
use crate::net::{NetError, Network};
use crate::net::evaluator::Evaluator;
use super::io;

const NAME: &str = "Willow";
const AUTHOR: &str = "Mike Leany";

// Searches started without an explicit limit still answer `stop`.
const INFINITE: Duration = Duration::from_secs(3600);

lazy_static! {
    // a move in UCI long algebraic notation, as listed after "position ... moves"
    static ref MOVE_RE: Regex = Regex::new("^[a-h][1-8][a-h][1-8][nbrq]?$").expect("INFALLIBLE");
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The engine side of the UCI protocol.
///
/// The shell owns the current game state and a shared handle to the engine. Searches run on a
/// background thread so that `stop` and `quit` stay responsive; the thread prints `bestmove`
/// when the search resolves.
#[derive(Debug)]
pub struct Uci {
    client: io::Client,
    net_path: PathBuf,
    options: Options,
    evaluator: Arc<Evaluator>,
    engine: Arc<Engine>,
    state: GameState,
    search: Option<thread::JoinHandle<()>>,
}

impl Uci {
    /// Loads the network and sets up the protocol shell.
    ///
    /// A network that cannot be loaded is fatal here; the engine never starts without one.
    pub fn new(net_path: &Path, options: Options) -> Result<Uci, NetError> {
        let evaluator = build_evaluator(net_path, options.use_gpu)?;
        let engine = Arc::new(Engine::new(Arc::clone(&evaluator) as Arc<dyn crate::engine::Evaluate>, options));

        Ok(Uci {
            client: io::Client::connect(),
            net_path: net_path.to_path_buf(),
            options,
            evaluator,
            engine,
            state: GameState::new(Board::new()),
            search: None,
        })
    }

    /// Runs the protocol loop until `quit` or end of input.
    pub fn run(&mut self) {
        while let Ok(line) = self.client.recv() {
            let line = line.trim();
            let (command, args) = match line.find(char::is_whitespace) {
                Some(at) => (&line[..at], line[at..].trim_start()),
                None => (line, ""),
            };

            match command {
                "uci" => {
                    io::Client::send(&format!("id name {}", NAME));
                    io::Client::send(&format!("id author {}", AUTHOR));
                    io::Client::send(&format!(
                        "option name Threads type spin default {} min 1 max 256",
                        self.options.threads));
                    io::Client::send("option name UseGPU type check default false");
                    io::Client::send(&format!(
                        "option name CPuct type spin default {} min 1 max 1000",
                        (self.options.c_puct * 10.0).round() as i64));
                    io::Client::send(&format!(
                        "option name VisitLimit type spin default {} min 1 max 1000000000",
                        self.options.visit_limit));
                    io::Client::send("uciok");
                }
                "isready" => io::Client::send("readyok"),
                "setoption" => self.set_option(args),
                "ucinewgame" => self.new_game(),
                "position" => self.set_position(args),
                "go" => self.go(args),
                "stop" | "ponderhit" => self.engine.stop(),
                "quit" => {
                    self.engine.stop();
                    self.finish_search();
                    info!("quitting");
                    return;
                }
                "" => { }
                other => debug!("ignoring unknown command: {}", other),
            }
        }

        // the client hung up
        self.engine.stop();
        self.finish_search();
    }

    // Waits for an outstanding search thread to print its bestmove and exit.
    fn finish_search(&mut self) {
        if let Some(search) = self.search.take() {
            let _ = search.join();
        }
    }

    fn set_option(&mut self, args: &str) {
        let mut tokens = args.split_whitespace();
        if tokens.next() != Some("name") {
            return;
        }
        let mut name = Vec::new();
        let mut value = Vec::new();
        let mut in_value = false;
        for token in tokens {
            if token == "value" && !in_value {
                in_value = true;
            } else if in_value {
                value.push(token);
            } else {
                name.push(token);
            }
        }
        let name = name.join(" ").to_lowercase();
        let value = value.join(" ");

        match name.as_str() {
            "threads" => {
                if let Ok(threads) = value.parse::<usize>() {
                    self.options.threads = threads.clamp(1, 256);
                }
            }
            "usegpu" => {
                // takes effect when the engine is recreated on the next new game
                self.options.use_gpu = value.eq_ignore_ascii_case("true");
            }
            "cpuct" => {
                if let Ok(tenths) = value.parse::<i64>() {
                    self.options.c_puct = tenths.clamp(1, 1000) as f32 / 10.0;
                }
            }
            "visitlimit" => {
                if let Ok(limit) = value.parse::<u64>() {
                    self.options.visit_limit = limit.max(1);
                }
            }
            other => {
                debug!("ignoring unknown option: {}", other);
                return;
            }
        }

        info!("options are now {:?}", self.options);
        self.engine.stop();
        self.finish_search();
        self.engine = Arc::new(Engine::new(Arc::clone(&self.evaluator) as Arc<dyn crate::engine::Evaluate>, self.options));
    }

    fn new_game(&mut self) {
        self.engine.stop();
        self.finish_search();

        // Recreate the engine. The network is reloaded so that a changed UseGPU option can
        // pick a different session kind; on failure the old evaluator stays in service.
        match build_evaluator(&self.net_path, self.options.use_gpu) {
            Ok(evaluator) => self.evaluator = evaluator,
            Err(err) => error!("keeping the previous network: {}", err),
        }
        self.engine = Arc::new(Engine::new(Arc::clone(&self.evaluator) as Arc<dyn crate::engine::Evaluate>, self.options));
        self.state = GameState::new(Board::new());
    }

    fn set_position(&mut self, args: &str) {
        self.engine.stop();
        self.finish_search();

        if let Some(state) = parse_position(args) {
            self.state = state;
            // a new root invalidates the tree
            self.engine.clear();
        }
    }

    fn go(&mut self, args: &str) {
        self.engine.stop();
        self.finish_search();

        let budget = parse_go(args, self.state.board().turn(), self.engine.options().visit_limit);
        info!("go: {:?}", budget);

        let engine = Arc::clone(&self.engine);
        let state = self.state.clone();
        self.search = Some(thread::spawn(move || {
            match engine.search(&state, budget) {
                Ok(Some(best)) => io::Client::send(&format!("bestmove {}", best)),
                Ok(None) => io::Client::send("bestmove 0000"),
                Err(err) => {
                    error!("search failed: {}", err);
                    io::Client::send("bestmove 0000");
                }
            }
        }));
    }
}

fn build_evaluator(net_path: &Path, use_gpu: bool) -> Result<Arc<Evaluator>, NetError> {
    let network = Network::load(net_path, use_gpu)?;
    Ok(Arc::new(Evaluator::new(network, DEFAULT_CAPACITY)))
}

// Interprets the arguments of a `position` command. Returns `None` when the position itself
// is unusable, in which case the current state is kept. Unparsable or illegal moves in the
// move list are skipped; the remaining moves still apply.
fn parse_position(args: &str) -> Option<GameState> {
    let mut tokens = args.split_whitespace();

    let board = match tokens.next() {
        Some("startpos") => Board::new(),
        Some("fen") => {
            let fen: Vec<&str> = tokens.by_ref().take_while(|&token| token != "moves").collect();
            match fen.join(" ").parse() {
                Ok(board) => board,
                Err(err) => {
                    warn!("ignoring malformed position: {}", err);
                    return None;
                }
            }
        }
        _ => {
            warn!("ignoring malformed position command: {}", args);
            return None;
        }
    };

    let mut state = GameState::new(board);
    for token in tokens {
        if token == "moves" || !MOVE_RE.is_match(token) {
            continue;
        }
        match movegen::move_from_uci(state.board(), token) {
            Ok(m) => {
                state.push(m);
            }
            Err(err) => debug!("skipping move {}: {}", token, err),
        }
    }

    Some(state)
}

// Interprets the arguments of a `go` command into a search budget.
fn parse_go(args: &str, turn: chess::Color, visit_limit: u64) -> SearchBudget {
    let mut movetime = None;
    let mut wtime = None;
    let mut btime = None;
    let mut winc = None;
    let mut binc = None;
    let mut movestogo = None;
    let mut visits = None;
    let mut infinite = false;

    let mut tokens = args.split_whitespace();
    while let Some(keyword) = tokens.next() {
        match keyword {
            "infinite" => infinite = true,
            "ponder" => { }
            "movetime" | "wtime" | "btime" | "winc" | "binc" | "movestogo" | "visits"
            | "nodes" => {
                let value = match tokens.next().and_then(|v| v.parse::<u64>().ok()) {
                    Some(value) => value,
                    None => continue,
                };
                match keyword {
                    "movetime" => movetime = Some(value),
                    "wtime" => wtime = Some(value),
                    "btime" => btime = Some(value),
                    "winc" => winc = Some(value),
                    "binc" => binc = Some(value),
                    "movestogo" => movestogo = Some(value),
                    // a visit budget; "nodes" is accepted as a synonym
                    "visits" | "nodes" => visits = Some(value),
                    _ => unreachable!(),
                }
            }
            other => debug!("ignoring go parameter: {}", other),
        }
    }

    if let Some(millis) = movetime {
        SearchBudget::Time(Duration::from_millis(millis))
    } else if wtime.is_some() || btime.is_some() {
        let (time, inc) = match turn {
            chess::Color::White => (wtime.unwrap_or(0), winc.unwrap_or(0)),
            chess::Color::Black => (btime.unwrap_or(0), binc.unwrap_or(0)),
        };
        SearchBudget::Time(clock_budget(time, inc, movestogo))
    } else if infinite {
        SearchBudget::Time(INFINITE)
    } else if let Some(visits) = visits {
        SearchBudget::Visits(visits.min(visit_limit))
    } else {
        SearchBudget::Visits(visit_limit)
    }
}

// How much of the remaining clock to spend on this move.
fn clock_budget(time: u64, inc: u64, movestogo: Option<u64>) -> Duration {
    let movestogo = movestogo.unwrap_or(30);
    let millis = time as f64 / (movestogo as f64 + 2.5) + 0.8 * inc as f64 - 50.0;
    Duration::from_millis(millis.max(20.0) as u64)
}
