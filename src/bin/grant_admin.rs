use std::env;

use judgement_bot::config::database_url_from_env;
use judgement_bot::ledger::{get_or_create_user, set_admin};
use judgement_bot::{establish_connection, run_migrations};

fn main() {
    let Some(discord_id) = env::args().nth(1) else {
        eprintln!("Usage: grant_admin <discord_id>");
        std::process::exit(2);
    };
    let database_url = database_url_from_env().expect("DATABASE_URL must be set in .env.");
    let mut conn = establish_connection(&database_url).expect("Failed to connect to database");
    run_migrations(&mut conn).expect("Failed to run migrations");

    let user = get_or_create_user(&mut conn, &discord_id).expect("Failed to look up user");
    let user = set_admin(&mut conn, user.id, true).expect("Failed to grant admin");
    println!("User #{} ({}) is now a bot admin.", user.id, user.discord_id);
}
