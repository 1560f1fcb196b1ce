//! Interactive console for the log-database client.
//!
//! ```bash
//! # Connect at startup
//! logdb-cli --host logdb.example.com:8080 --user admin --password secret
//!
//! # Or start disconnected and use the `connect` command
//! logdb-cli
//! ```

use clap::Parser;
use logdb_link::{LogDbClient, LogDbError};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Interactive console for a remote log database.
#[derive(Parser, Debug)]
#[command(name = "logdb-cli")]
#[command(version, about = "Interactive console for a remote log database", long_about = None)]
struct Cli {
    /// Server host or host:port
    #[arg(short = 'H', long = "host")]
    host: Option<String>,

    /// Login name
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// Login password
    #[arg(short = 'p', long = "password")]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

const HELP: &str = "\
commands:
  connect <host> <user> <password>   open a session
  disconnect                         close the session
  queries                            list registered queries
  query <query string>               run a query and print all rows
  create_query <query string>        register a query, print its id
  start_query <id>                   start a created or stopped query
  stop_query <id>                    stop a running query
  remove_query <id>                  remove a query
  fetch <id> <offset> <limit>        print one page of results
  help                               show this help
  quit                               exit";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let mut console = Console { client: None };

    if let (Some(host), Some(user)) = (cli.host.as_deref(), cli.user.as_deref()) {
        let password = cli.password.as_deref().unwrap_or("");
        console.connect(host, user, password).await;
    }

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("failed to initialize the line editor: {}", e);
            return;
        }
    };

    loop {
        match editor.readline("logdb> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if !console.dispatch(line).await {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {}", e);
                break;
            }
        }
    }

    console.disconnect().await;
}

struct Console {
    client: Option<LogDbClient>,
}

impl Console {
    /// Returns false when the loop should exit.
    async fn dispatch(&mut self, line: &str) -> bool {
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "quit" | "exit" => return false,
            "help" => println!("{}", HELP),
            "connect" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(host), Some(user), Some(password)) => {
                        self.connect(host, user, password).await
                    }
                    _ => println!("usage: connect <host> <user> <password>"),
                }
            }
            "disconnect" => self.disconnect().await,
            "queries" => self.queries(),
            "query" => self.run_query(rest).await,
            "create_query" => self.create_query(rest).await,
            "start_query" => self.with_id(rest, "start_query", Action::Start).await,
            "stop_query" => self.with_id(rest, "stop_query", Action::Stop).await,
            "remove_query" => self.with_id(rest, "remove_query", Action::Remove).await,
            "fetch" => self.fetch(rest).await,
            other => println!("unknown command: {} (try `help`)", other),
        }
        true
    }

    async fn connect(&mut self, host: &str, user: &str, password: &str) {
        if self.client.is_some() {
            println!("already connected; `disconnect` first");
            return;
        }
        match LogDbClient::connect(host, user, password).await {
            Ok(client) => {
                println!("connected to {}", host);
                self.client = Some(client);
            }
            Err(e) => print_error(&e),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.logout().await {
                print_error(&e);
            }
            client.close().await;
            println!("disconnected");
        }
    }

    fn queries(&self) {
        let Some(client) = &self.client else {
            println!("not connected");
            return;
        };
        let infos = client.queries();
        if infos.is_empty() {
            println!("no queries");
        }
        for info in infos {
            println!("{}", info);
        }
    }

    async fn run_query(&self, query_string: &str) {
        let Some(client) = &self.client else {
            println!("not connected");
            return;
        };
        if query_string.is_empty() {
            println!("usage: query <query string>");
            return;
        }
        match client.query(query_string).await {
            Ok(mut cursor) => {
                let mut count: u64 = 0;
                while let Some(row) = cursor.next().await {
                    match row {
                        Ok(row) => {
                            println!("{}", row);
                            count += 1;
                        }
                        Err(e) => {
                            print_error(&e);
                            break;
                        }
                    }
                }
                println!("{} row(s)", count);
            }
            Err(e) => print_error(&e),
        }
    }

    async fn create_query(&self, query_string: &str) {
        let Some(client) = &self.client else {
            println!("not connected");
            return;
        };
        if query_string.is_empty() {
            println!("usage: create_query <query string>");
            return;
        }
        match client.create_query(query_string).await {
            Ok(id) => println!("created query {}", id),
            Err(e) => print_error(&e),
        }
    }

    async fn with_id(&self, rest: &str, name: &str, action: Action) {
        let Some(client) = &self.client else {
            println!("not connected");
            return;
        };
        let Ok(id) = rest.parse::<u64>() else {
            println!("usage: {} <id>", name);
            return;
        };
        let result = match action {
            Action::Start => client.start_query(id).await,
            Action::Stop => client.stop_query(id).await,
            Action::Remove => client.remove_query(id).await,
        };
        match result {
            Ok(()) => println!("ok"),
            Err(e) => print_error(&e),
        }
    }

    async fn fetch(&self, rest: &str) {
        let Some(client) = &self.client else {
            println!("not connected");
            return;
        };
        let mut parts = rest.split_whitespace();
        let parsed = (
            parts.next().and_then(|s| s.parse::<u64>().ok()),
            parts.next().and_then(|s| s.parse::<u64>().ok()),
            parts.next().and_then(|s| s.parse::<u64>().ok()),
        );
        let (Some(id), Some(offset), Some(limit)) = parsed else {
            println!("usage: fetch <id> <offset> <limit>");
            return;
        };
        match client.get_result(id, offset, limit).await {
            Ok(page) => {
                for row in &page.rows {
                    println!("{}", row);
                }
                println!("{} row(s) at offset {}", page.rows.len(), page.offset);
            }
            Err(e) => print_error(&e),
        }
    }
}

enum Action {
    Start,
    Stop,
    Remove,
}

fn print_error(e: &LogDbError) {
    match e {
        LogDbError::QueryNotFound(id) => println!("no such query: {}", id),
        LogDbError::AuthenticationError(detail) => println!("login failed: {}", detail),
        LogDbError::ConnectError(detail) => println!("cannot connect: {}", detail),
        LogDbError::RemoteError { code, message } => {
            println!("server error [{}]: {}", code, message)
        }
        other => println!("error: {}", other),
    }
}
