use std::io::IsTerminal;
use std::io::Read;
use std::time::Duration;

use memori_core::AuthStatus;
use memori_core::CredentialStore;
use memori_core::config::LoginDefaults;
use memori_login::LoginError;
use memori_login::LoginOptions;
use memori_login::LoginSuccess;
use memori_login::run_login_flow;
use owo_colors::OwoColorize;
use supports_color::Stream;
use tracing::debug;

/// Login flags as parsed from the command line; unset flags fall back to the
/// environment-derived defaults.
#[derive(Debug, Default)]
pub struct LoginFlowArgs {
    pub auth_base: Option<String>,
    pub login_url: Option<String>,
    pub next_url: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<u64>,
    pub deadline: Option<u64>,
}

impl LoginFlowArgs {
    fn apply_to(self, mut opts: LoginOptions) -> LoginOptions {
        if let Some(auth_base) = self.auth_base {
            opts.auth_base = auth_base;
        }
        if let Some(login_url) = self.login_url {
            opts.login_url = login_url;
        }
        if let Some(next_url) = self.next_url {
            opts.next_url = next_url;
        }
        if let Some(port) = self.port {
            opts.preferred_port = port;
        }
        if let Some(timeout) = self.timeout {
            opts.wait_timeout = Duration::from_secs(timeout);
        }
        if let Some(deadline) = self.deadline {
            opts.deadline = Duration::from_secs(deadline);
        }
        opts
    }
}

fn login_options(args: LoginFlowArgs) -> LoginOptions {
    args.apply_to(LoginOptions::from_defaults(&LoginDefaults::from_env()))
}

pub async fn run_login(args: LoginFlowArgs) -> ! {
    let store = CredentialStore::new();
    let opts = login_options(args);
    debug!("starting login against {}", opts.auth_base);

    let result = tokio::select! {
        result = run_login_flow(opts, store) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Login cancelled.");
            std::process::exit(130);
        }
    };

    match result {
        Ok(LoginSuccess { email, store_error }) => {
            match email {
                Some(email) => {
                    println!("{}", success(&format!("Authenticated as {email}. Welcome to Memori!")))
                }
                None => println!("{}", success("Authenticated. Welcome to Memori!")),
            }
            if let Some(error) = store_error {
                eprintln!("Warning: {error}");
                eprintln!("You can set MEMORI_API_KEY in your environment instead.");
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        Err(error @ LoginError::TimedOut) => {
            eprintln!("{error}");
            eprintln!("Run `memori login` to try again.");
            std::process::exit(1);
        }
        Err(error) => {
            eprintln!("Login failed: {error}");
            std::process::exit(1);
        }
    }
}

/// Stores a key supplied on stdin without going through the browser flow.
pub fn run_login_with_api_key(api_key: String) -> ! {
    let store = CredentialStore::new();
    match store.save(&api_key, None) {
        Ok(()) => {
            println!("{}", success("Stored API key in your system keychain."));
            std::process::exit(0);
        }
        Err(error) => {
            eprintln!("Failed to save API key: {error}");
            eprintln!("You can set MEMORI_API_KEY in your environment instead.");
            std::process::exit(1);
        }
    }
}

pub fn read_api_key_from_stdin() -> String {
    let mut stdin = std::io::stdin();

    if stdin.is_terminal() {
        eprintln!(
            "--with-api-key expects the API key on stdin. Try piping it, e.g. `printenv MEMORI_API_KEY | memori login --with-api-key`."
        );
        std::process::exit(1);
    }

    eprintln!("Reading API key from stdin...");

    let mut buffer = String::new();
    if let Err(err) = stdin.read_to_string(&mut buffer) {
        eprintln!("Failed to read API key from stdin: {err}");
        std::process::exit(1);
    }

    let api_key = buffer.trim().to_string();
    if api_key.is_empty() {
        eprintln!("No API key provided via stdin.");
        std::process::exit(1);
    }

    api_key
}

pub fn run_status() -> ! {
    let store = CredentialStore::new();
    match store.status() {
        AuthStatus::Authenticated { email, source } => {
            match email {
                Some(email) => println!("{}", success(&format!("Authenticated as {email}."))),
                None => println!("{}", success("Authenticated.")),
            }
            println!("Using {}.", source.describe());
            std::process::exit(0);
        }
        AuthStatus::NotAuthenticated => {
            println!("Not logged in. Run `memori login` to get started.");
            std::process::exit(1);
        }
    }
}

pub fn run_logout() -> ! {
    let store = CredentialStore::new();
    match store.logout() {
        Ok(true) => println!("{}", success("Logged out of Memori.")),
        Ok(false) => println!("No stored credentials to remove."),
        Err(error) => {
            eprintln!("Failed to clear keychain credentials: {error}");
            std::process::exit(1);
        }
    }

    // An env override outlives logout on purpose; say so instead of
    // silently leaving the user authenticated.
    if CredentialStore::env_override_active() {
        println!("MEMORI_API_KEY is still set in your environment. Unset it to fully log out.");
    }
    std::process::exit(0);
}

fn success(message: &str) -> String {
    if supports_color::on(Stream::Stdout).is_some() {
        message.green().to_string()
    } else {
        message.to_string()
    }
}
