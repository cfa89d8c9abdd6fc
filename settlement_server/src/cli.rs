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
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "MSL_HOST",
        "MSL_PORT",
        "MSL_DATABASE_URL",
        "MSL_TOKEN_LIFETIME_HOURS",
        "MSL_STOREFRONT_HMAC_CHECKS",
        "MSL_STOREFRONT_IP_WHITELIST",
        "MSL_USE_X_FORWARDED_FOR",
        "MSL_USE_FORWARDED",
        "MSL_SWEEP_INTERVAL_SECS",
        "MSL_AUTO_CONFIRM_GRACE_DAYS",
        "MSL_SWEEP_LIMIT",
        "MSL_AUTO_RELEASE",
        "MSL_PUBLIC_HOLIDAYS",
        "MSL_BOOTSTRAP_ADMIN_USERNAME",
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
