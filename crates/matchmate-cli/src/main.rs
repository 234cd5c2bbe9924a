//! matchmate - a terminal client for the matchmate profile-matching service.
//!
//! Signs in, keeps the session fresh across runs, and prints profiles,
//! matches, favourites and search results as JSON.

mod app;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use matchmate_core::api::client::DEFAULT_TOP_FAVOURITES;
use matchmate_core::models::{NewProfileForm, ProfileSearchParams};
use matchmate_core::router::RouteName;

const USAGE: &str = "\
Usage: matchmate <command> [args]

Account:
  login [username] [--redirect <path>] Sign in (password is prompted), then open <path>
  register <username> <email> <name> [--photo <file>]
  logout                               Sign out and forget the stored tokens
  whoami                               Show the signed-in user

Pages:
  open <path>                          Resolve a page through the navigation guard

Data:
  profiles                             Your profiles
  profile <id>                         One profile
  new-profile <file.json>              Create a profile from a JSON file
  matches <profile-id>                 Profiles matching one of yours
  search [--name N] [--sex S] [--race R] [--birth-year Y]
  favourites                           Users you have favourited
  favourite <user-id>                  Add a user to your favourites
  top [n]                              Most favoured users (default 20)
  user <id>                            Public details of a user

Set RUST_LOG=debug for request logging.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "--help" || command == "-h" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut app = App::new()?;
    info!(command = %command, "matchmate starting");

    if let Err(e) = run(&mut app, command, &args[1..]).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(app: &mut App, command: &str, args: &[String]) -> Result<()> {
    match command {
        "login" => {
            let redirect = flag_value(args, "--redirect")?;
            let page = app.open(&App::login_location(redirect.as_deref()).full_path())?;
            // Guest-only page: the guard sends signed-in users home
            if page.route == RouteName::Home {
                if let Some(user) = app.current_user() {
                    println!("Already logged in as {}", user.display_name());
                    return Ok(());
                }
            }
            let username = args.first().filter(|a| !a.starts_with("--")).cloned();
            let user = app.login_interactive(username).await?;
            println!("Logged in as {}", user.display_name());

            let landed = app.open(&App::post_login_target(&page.location))?;
            println!("Continue at {} ({:?})", landed.location, landed.route);
        }
        "register" => {
            let [username, email, name] = match args {
                [u, e, n, ..] => [u, e, n],
                _ => anyhow::bail!("register needs <username> <email> <name>"),
            };
            let photo = flag_value(args, "--photo")?.map(PathBuf::from);
            app.open("/register")?;
            let user = app.register(username, email, name, photo.as_deref()).await?;
            println!("Welcome, {}!", user.display_name());
        }
        "logout" => {
            app.logout().await?;
            println!("Logged out");
        }
        "whoami" => match app.current_user() {
            Some(user) => print_json(&user)?,
            None => println!("Not logged in"),
        },
        "open" => {
            let path = required(args, 0, "path")?;
            let resolution = app.open(path)?;
            println!("{:?} {}", resolution.route, resolution.location);
            if let Some(from) = resolution.redirected_from {
                println!("  (redirected from {})", from);
            }
        }
        "profiles" => {
            app.open("/profiles")?;
            print_json(&app.api.get_profiles().await?)?;
        }
        "profile" => {
            let id = parse_id(required(args, 0, "id")?)?;
            app.open(&format!("/profiles/{}", id))?;
            print_json(&app.api.get_profile(id).await?)?;
        }
        "new-profile" => {
            let path = required(args, 0, "file.json")?;
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path))?;
            let form: NewProfileForm = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path))?;
            app.open("/profiles/new")?;
            print_json(&app.api.create_profile(&form).await?)?;
        }
        "matches" => {
            let id = parse_id(required(args, 0, "profile-id")?)?;
            app.open(&format!("/profiles/{}", id))?;
            print_json(&app.api.get_matches(id).await?)?;
        }
        "search" => {
            let params = ProfileSearchParams {
                name: flag_value(args, "--name")?,
                sex: flag_value(args, "--sex")?,
                race: flag_value(args, "--race")?,
                birth_year: flag_value(args, "--birth-year")?
                    .map(|y| y.parse::<i32>().context("--birth-year must be a year"))
                    .transpose()?,
            };
            app.open("/")?;
            print_json(&app.api.search(&params).await?)?;
        }
        "favourites" => {
            app.open("/profiles/favourites")?;
            print_json(&app.api.get_favourites().await?)?;
        }
        "favourite" => {
            let id = parse_id(required(args, 0, "user-id")?)?;
            app.open("/profiles/favourites")?;
            print_json(&app.api.add_favourite(id).await?)?;
        }
        "top" => {
            let count = match args.first() {
                Some(n) => n.parse::<u32>().context("n must be a number")?,
                None => DEFAULT_TOP_FAVOURITES,
            };
            app.open("/profiles/favourites")?;
            print_json(&app.api.get_top_favourites(count).await?)?;
        }
        "user" => {
            let id = parse_id(required(args, 0, "id")?)?;
            print_json(&app.api.get_user(id).await?)?;
        }
        other => anyhow::bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing <{}>", name))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse().with_context(|| format!("'{}' is not a valid id", raw))
}

/// Value following `flag`, if the flag is present.
fn flag_value(args: &[String], flag: &str) -> Result<Option<String>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("{} needs a value", flag)),
        None => Ok(None),
    }
}
