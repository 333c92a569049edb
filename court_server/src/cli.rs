use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets are left out on purpose
    const DISPLAY_ENVS: [&str; 12] = [
        "RUST_LOG",
        "FCO_HOST",
        "FCO_PORT",
        "FCO_DATABASE_URL",
        "FCO_DB_MAX_CONNECTIONS",
        "FCO_GATEWAY_URL",
        "FCO_GATEWAY_KEY_ID",
        "FCO_GATEWAY_TIMEOUT_MS",
        "FCO_STREAM_SESSION_SECS",
        "FCO_ABANDONED_CART_MINUTES",
        "FCO_STALE_PAYOUT_MINUTES",
        "FCO_NOTIFICATION_BUFFER",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
