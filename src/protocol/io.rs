//! Line-based input and output between the protocol shell and the GUI.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
//! Standard input blocks, and the shell must stay free to react to `stop` while a search is
//! printing its result, so a dedicated thread reads lines and hands them over on a channel.
//! Everything that crosses the boundary in either direction lands in the log.
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{channel, Receiver, RecvError, Sender};
use std::thread;
use log::{debug, error};

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The shell's end of the conversation with the GUI
#[derive(Debug)]
pub struct Client {
    lines: Receiver<String>,
}

impl Client {
    /// Starts the input thread and returns the receiving end.
    pub fn connect() -> Client {
        let (sender, lines) = channel();
        thread::Builder::new()
            .name("stdin".to_string())
            .spawn(move || read_lines(sender))
            .expect("failed to spawn the input thread");

        Client { lines }
    }

    /// Returns the next input line, blocking until one arrives. An error means the input
    /// has closed for good.
    pub fn recv(&self) -> Result<String, RecvError> {
        self.lines.recv()
    }

    /// Writes one line to the GUI.
    pub fn send(line: &str) {
        println!("{}", line);
        let _ = io::stdout().flush();
        debug!(">>> {}", line);
    }
}

fn read_lines(sender: Sender<String>) {
    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                let line = line.trim().to_string();
                debug!("<<< {}", line);
                if sender.send(line).is_err() {
                    // the shell is gone, so is our reason to exist
                    return;
                }
            }
            Err(err) => {
                error!("cannot read from stdin: {}", err);
                return;
            }
        }
    }
    debug!("input closed");
}
