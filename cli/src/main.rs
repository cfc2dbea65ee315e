use clap::CommandFactory;
use clap::Parser;
use clap_complete::Shell;
use clap_complete::generate;
use memori_cli::login::LoginFlowArgs;
use memori_cli::login::read_api_key_from_stdin;
use memori_cli::login::run_login;
use memori_cli::login::run_login_with_api_key;
use memori_cli::login::run_logout;
use memori_cli::login::run_status;
use tracing_subscriber::EnvFilter;

/// Memori CLI
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "memori")]
struct MultitoolCli {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Authenticate via your browser.
    Login(LoginCommand),

    /// Show which credential source is active.
    Status,

    /// Remove stored authentication credentials.
    Logout,

    /// Generate shell completion scripts.
    Completion(CompletionCommand),
}

#[derive(Debug, Parser)]
struct LoginCommand {
    /// Token flow service base URL.
    #[arg(long = "auth-base", value_name = "URL")]
    auth_base: Option<String>,

    /// Login page to open in the browser.
    #[arg(long = "login-url", value_name = "URL")]
    login_url: Option<String>,

    /// Path to open after authentication completes.
    #[arg(long = "next-url", value_name = "PATH")]
    next_url: Option<String>,

    /// Preferred local loopback port.
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Seconds each auth polling request may wait server-side.
    #[arg(long = "timeout", value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Overall seconds to wait for the browser sign-in before giving up.
    #[arg(long = "deadline", value_name = "SECONDS")]
    deadline: Option<u64>,

    #[arg(
        long = "with-api-key",
        help = "Read the API key from stdin (e.g. `printenv MEMORI_API_KEY | memori login --with-api-key`)"
    )]
    with_api_key: bool,
}

#[derive(Debug, Parser)]
struct CompletionCommand {
    /// Shell to generate completions for
    #[clap(value_enum, default_value_t = Shell::Bash)]
    shell: Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = MultitoolCli::parse();
    match cli.subcommand {
        Subcommand::Login(login_cli) => {
            if login_cli.with_api_key {
                let api_key = read_api_key_from_stdin();
                run_login_with_api_key(api_key);
            }
            run_login(LoginFlowArgs {
                auth_base: login_cli.auth_base,
                login_url: login_cli.login_url,
                next_url: login_cli.next_url,
                port: login_cli.port,
                timeout: login_cli.timeout,
                deadline: login_cli.deadline,
            })
            .await
        }
        Subcommand::Status => run_status(),
        Subcommand::Logout => run_logout(),
        Subcommand::Completion(completion_cli) => {
            let mut app = MultitoolCli::command();
            generate(
                completion_cli.shell,
                &mut app,
                "memori",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
