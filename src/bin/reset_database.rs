use judgement_bot::config::database_url_from_env;
use judgement_bot::{establish_connection, reset_database, run_migrations};

fn main() {
    let database_url = database_url_from_env().expect("DATABASE_URL must be set in .env.");
    let mut conn = establish_connection(&database_url).expect("Failed to connect to database");
    run_migrations(&mut conn).expect("Failed to run migrations");
    reset_database(&mut conn).expect("Failed to reset database");
    println!("Database has been reset.");
}
