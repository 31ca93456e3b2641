//! A dialog that asks for a name, then nests that whole dialog as a
//! subdialog of a larger one asking what topic the visitor wants to talk
//! about. Demonstrates replay across turns and a dialog value composed of
//! another dialog value.
//!
//! Run with `cargo run --example name_getter --features in-memory`.

use std::io::{self, Write};

use dialogs::{get_client_response, send_message, Dialog, InMemoryPersistence, TurnOutcome};

fn name_getter() -> Dialog<String, String, String> {
    Dialog::plain("name_getter", "1.0", |ctx| {
        ctx.run(send_message("Hello."))?;
        ctx.run(send_message("Nice to meet you!"))?;
        ctx.run(send_message("What is your name?"))?;
        ctx.run(get_client_response())
    })
}

fn topic() -> Dialog<(String, String), String, String> {
    Dialog::plain("topic", "1.0", |ctx| {
        let name = ctx.run(name_getter())?;
        ctx.run(send_message(format!("Hi {}!", name)))?;
        ctx.run(send_message("What would you like to talk about?"))?;
        let topic = ctx.run(get_client_response())?;
        Ok((name, topic))
    })
}

fn main() {
    env_logger::init();

    let persistence = InMemoryPersistence::new();
    let mut client_response = None;

    loop {
        let outcome = dialogs::run_turn(topic, &persistence, client_response.take(), None::<fn() -> Dialog<(), String, String>>).expect("topic dialog failed");

        match outcome {
            TurnOutcome::Done { return_value: (name, topic), messages } => {
                print_messages(&messages);
                println!("({}, {})", name, topic);
                break;
            }
            TurnOutcome::Pending { messages } => {
                print_messages(&messages);
                print!("> ");
                io::stdout().flush().expect("failed to flush stdout");
                let mut line = String::new();
                io::stdin().read_line(&mut line).expect("failed to read a response");
                client_response = Some(line.trim().to_owned());
            }
        }
    }
}

fn print_messages(messages: &[String]) {
    for message in messages {
        println!("{}", message);
    }
}
