//! A guessing-game dialog: the engine picks a number between 1 and 10 the
//! first time it runs, then repeatedly asks for a guess until it is right.
//!
//! The number is itself a dialog (`rand`), not a local variable — a local
//! variable would be re-randomized every time the dialog body replays after
//! a restart, which would make every previous guess wrong.
//!
//! Run with `cargo run --example guess_number --features in-memory`, then
//! type guesses at the prompt.

use std::io::{self, Write};

use dialogs::{get_client_response, send_message, Dialog, InMemoryPersistence, SyncCtx, TurnOutcome};
use rand::Rng;

fn rand() -> Dialog<i32, String, String> {
    Dialog::plain("rand", "1.0", |_ctx: &SyncCtx<String, String>| Ok(rand::thread_rng().gen_range(1..=10)))
}

fn game() -> Dialog<(), String, String> {
    Dialog::plain("game", "1.1", |ctx| {
        ctx.run(send_message("Guess a number between 1 and 10."))?;
        let correct_number = ctx.run(rand())?;

        loop {
            let guess = ctx.run(get_client_response())?;
            match guess.trim().parse::<i32>() {
                Ok(guess) if guess == correct_number => break,
                _ => {
                    ctx.run(send_message("That's not it..."))?;
                }
            }
        }

        ctx.run(send_message(format!("Awesome! The number is {}.", correct_number)))?;
        ctx.run(send_message("Bye bye."))?;
        Ok(())
    })
}

fn main() {
    env_logger::init();

    let persistence = InMemoryPersistence::new();
    let mut client_response = None;

    loop {
        let outcome = dialogs::run_turn(game, &persistence, client_response.take(), None::<fn() -> Dialog<(), String, String>>).expect("game dialog failed");

        let messages = match outcome {
            TurnOutcome::Done { messages, .. } => {
                print_messages(&messages);
                break;
            }
            TurnOutcome::Pending { messages } => messages,
        };
        print_messages(&messages);

        print!("> ");
        io::stdout().flush().expect("failed to flush stdout");
        let mut line = String::new();
        io::stdin().read_line(&mut line).expect("failed to read a guess");
        client_response = Some(line);
    }
}

fn print_messages(messages: &[String]) {
    for message in messages {
        println!("{}", message);
    }
}
