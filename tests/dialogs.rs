//! End-to-end turns against [`InMemoryPersistence`], covering replay, nested
//! dialogs, version mismatches, and fallback recovery.

#![cfg(feature = "in-memory")]

use dialogs::{get_client_response, send_message, Dialog, InMemoryPersistence, TurnOutcome};

fn name_getter() -> Dialog<String, String, String> {
    Dialog::plain("name_getter", "1.0", |ctx| {
        ctx.run(send_message("Hello."))?;
        ctx.run(send_message("Nice to meet you!"))?;
        ctx.run(send_message("what is your name?"))?;
        ctx.run(get_client_response())
    })
}

fn name_getter_v1_1() -> Dialog<String, String, String> {
    Dialog::plain("name_getter_take_2", "1.1", |ctx| {
        ctx.run(send_message("Tell me your name! Now!!!"))?;
        ctx.run(get_client_response())
    })
}

fn name_getter_take_3() -> Dialog<String, String, String> {
    Dialog::plain("name_getter_take_3", "1.0", |ctx| {
        ctx.run(send_message("I need to know your name"))?;
        let name = ctx.run(get_client_response())?;
        ctx.run(send_message("Wait! i have another message for you!"))?;
        Ok(name)
    })
}

fn topic() -> Dialog<(String, String), String, String> {
    Dialog::plain("topic", "1.0", |ctx| {
        let name = ctx.run(name_getter())?;
        ctx.run(send_message(format!("Hi {}!", name)))?;
        ctx.run(send_message("What would you like to talk about"))?;
        let topic = ctx.run(get_client_response())?;
        Ok((name, topic))
    })
}

fn fallback_without_client_response() -> Dialog<(), String, String> {
    Dialog::plain("fallback_without_client_response", "1.0", |ctx| {
        ctx.run(send_message("Falling back!"))
    })
}

fn fallback_with_client_response() -> Dialog<(), String, String> {
    Dialog::plain("fallback_with_client_response", "1.0", |ctx| {
        ctx.run(send_message("Falling back!"))?;
        ctx.run(get_client_response())?;
        ctx.run(send_message("Get up fool"))
    })
}

fn versioned_subdialog() -> Dialog<String, String, String> {
    Dialog::plain("versioned_subdialog", "1.0", |ctx| {
        ctx.run(send_message("I am a dialog"))?;
        ctx.run(get_client_response())
    })
}

fn versioned_subdialog_v1_1() -> Dialog<String, String, String> {
    Dialog::plain("versioned_subdialog_take_2", "1.1", |ctx| {
        ctx.run(send_message("I have a different version, HA! HA! HA!"))?;
        ctx.run(get_client_response())
    })
}

fn dialog_with_subdialog() -> Dialog<String, String, String> {
    Dialog::plain("dialog_with_subdialog", "1.0", |ctx| {
        ctx.run(versioned_subdialog())?;
        ctx.run(get_client_response())
    })
}

fn dialog_with_subdialog_take_2() -> Dialog<String, String, String> {
    Dialog::plain("dialog_with_subdialog_take_2", "1.0", |ctx| {
        ctx.run(versioned_subdialog_v1_1())?;
        ctx.run(get_client_response())
    })
}

fn echo(message: String) -> Dialog<(), String, String> {
    Dialog::plain("echo", "test", move |ctx| ctx.run(send_message(message)))
}

fn no_fallback() -> Option<fn() -> Dialog<(), String, String>> {
    None
}

#[test]
fn happy_flow_replays_across_two_turns() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(name_getter, &persistence, None, no_fallback()).unwrap();
    assert!(!turn1.is_done());
    match turn1 {
        TurnOutcome::Pending { messages } => {
            assert_eq!(messages, vec!["Hello.", "Nice to meet you!", "what is your name?"]);
        }
        _ => unreachable!(),
    }

    let turn2 = dialogs::run_turn(name_getter, &persistence, Some("Johnny".to_owned()), no_fallback()).unwrap();
    match turn2 {
        TurnOutcome::Done { return_value, messages } => {
            assert_eq!(return_value, "Johnny");
            assert!(messages.is_empty());
        }
        _ => panic!("expected the dialog to be done"),
    }
}

#[test]
fn nested_dialog_replays_across_three_turns() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(topic, &persistence, None, no_fallback()).unwrap();
    assert_eq!(turn1, TurnOutcome::Pending {
        messages: vec!["Hello.".to_owned(), "Nice to meet you!".to_owned(), "what is your name?".to_owned()],
    });

    let turn2 = dialogs::run_turn(topic, &persistence, Some("Johnny".to_owned()), no_fallback()).unwrap();
    assert_eq!(turn2, TurnOutcome::Pending {
        messages: vec!["Hi Johnny!".to_owned(), "What would you like to talk about".to_owned()],
    });

    let turn3 = dialogs::run_turn(topic, &persistence, Some("Peanuts".to_owned()), no_fallback()).unwrap();
    assert_eq!(turn3, TurnOutcome::Done {
        return_value: ("Johnny".to_owned(), "Peanuts".to_owned()),
        messages: Vec::new(),
    });
}

#[test]
fn version_mismatch_without_fallback_restarts_from_the_top() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(name_getter, &persistence, None, no_fallback()).unwrap();
    assert!(!turn1.is_done());

    let turn2 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Johnny".to_owned()), no_fallback()).unwrap();
    assert_eq!(turn2, TurnOutcome::Pending {
        messages: vec!["Tell me your name! Now!!!".to_owned()],
    });
}

#[test]
fn version_mismatch_with_fallback_resolves_within_the_same_turn() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(name_getter, &persistence, None, Some(fallback_without_client_response)).unwrap();
    assert_eq!(turn1, TurnOutcome::Pending {
        messages: vec!["Hello.".to_owned(), "Nice to meet you!".to_owned(), "what is your name?".to_owned()],
    });

    let turn2 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Julia".to_owned()), Some(fallback_without_client_response)).unwrap();
    assert_eq!(turn2, TurnOutcome::Pending {
        messages: vec!["Falling back!".to_owned(), "Tell me your name! Now!!!".to_owned()],
    });

    let turn3 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Johnny".to_owned()), Some(fallback_without_client_response)).unwrap();
    assert_eq!(turn3, TurnOutcome::Done {
        return_value: "Johnny".to_owned(),
        messages: Vec::new(),
    });
}

#[test]
fn fallback_spanning_multiple_turns_prepends_its_messages_once_done() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(name_getter, &persistence, None, Some(fallback_with_client_response)).unwrap();
    assert!(!turn1.is_done());

    let turn2 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Juanito".to_owned()), Some(fallback_with_client_response)).unwrap();
    assert_eq!(turn2, TurnOutcome::Pending {
        messages: vec!["Falling back!".to_owned()],
    });

    let turn3 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Julia".to_owned()), Some(fallback_with_client_response)).unwrap();
    assert_eq!(turn3, TurnOutcome::Pending {
        messages: vec!["Get up fool".to_owned(), "Tell me your name! Now!!!".to_owned()],
    });

    let turn4 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Johnny".to_owned()), Some(fallback_with_client_response)).unwrap();
    assert_eq!(turn4, TurnOutcome::Done {
        return_value: "Johnny".to_owned(),
        messages: Vec::new(),
    });
}

#[test]
fn version_mismatch_on_a_subdialog_triggers_fallback_even_though_the_root_version_is_unchanged() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(dialog_with_subdialog, &persistence, None, Some(fallback_without_client_response)).unwrap();
    assert_eq!(turn1, TurnOutcome::Pending {
        messages: vec!["I am a dialog".to_owned()],
    });

    let turn2 = dialogs::run_turn(dialog_with_subdialog_take_2, &persistence, Some("Julia".to_owned()), Some(fallback_without_client_response)).unwrap();
    assert_eq!(turn2, TurnOutcome::Pending {
        messages: vec!["Falling back!".to_owned(), "I have a different version, HA! HA! HA!".to_owned()],
    });
}

#[test]
fn fallback_reset_truncates_messages_left_over_from_the_old_dialog() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(name_getter_take_3, &persistence, None, Some(fallback_with_client_response)).unwrap();
    assert_eq!(turn1, TurnOutcome::Pending {
        messages: vec!["I need to know your name".to_owned()],
    });

    // name_getter_take_3's "Wait!" message, queued right after the client
    // response it was waiting for, never gets a chance to run: the version
    // swap is caught and the state wiped before replay reaches it.
    let turn2 = dialogs::run_turn(name_getter_v1_1, &persistence, Some("Julia".to_owned()), Some(fallback_without_client_response)).unwrap();
    assert_eq!(turn2, TurnOutcome::Pending {
        messages: vec!["Falling back!".to_owned(), "Tell me your name! Now!!!".to_owned()],
    });
}

fn no_op() -> Dialog<i32, String, String> {
    Dialog::plain("no_op", "1.0", |_ctx| Ok(42))
}

#[test]
fn a_dialog_with_no_steps_completes_on_the_first_turn() {
    let persistence = InMemoryPersistence::new();
    let turn = dialogs::run_turn(no_op, &persistence, None, no_fallback()).unwrap();
    assert_eq!(turn, TurnOutcome::Done {
        return_value: 42,
        messages: Vec::new(),
    });
}

#[test]
fn leftover_message_after_the_client_response_still_appears_in_the_done_turn() {
    let persistence = InMemoryPersistence::new();

    let turn1 = dialogs::run_turn(name_getter_take_3, &persistence, None, no_fallback()).unwrap();
    assert_eq!(turn1, TurnOutcome::Pending {
        messages: vec!["I need to know your name".to_owned()],
    });

    let turn2 = dialogs::run_turn(name_getter_take_3, &persistence, Some("Johnny".to_owned()), no_fallback()).unwrap();
    assert_eq!(turn2, TurnOutcome::Done {
        return_value: "Johnny".to_owned(),
        messages: vec!["Wait! i have another message for you!".to_owned()],
    });
}

#[test]
fn sync_entry_point_rejects_an_async_subdialog_with_unsupported_kind() {
    let persistence = InMemoryPersistence::new();

    fn sub_dialog() -> Dialog<i32, String, String> {
        Dialog::asynced("sub_dialog", "1.0", |_ctx| async move { Ok(5) })
    }

    fn root() -> Dialog<i32, String, String> {
        Dialog::plain("root_with_async_subdialog", "1.0", |ctx| ctx.run(sub_dialog()))
    }

    let outcome = dialogs::run_turn(root, &persistence, None, no_fallback());
    assert!(matches!(outcome, Err(dialogs::DialogError::UnsupportedKind { .. })));
}

#[test]
fn concurrent_sessions_never_mix_messages() {
    let inputs = ["first", "second", "third"];

    let handles: Vec<_> = inputs
        .iter()
        .map(|message| {
            let message = message.to_string();
            std::thread::spawn(move || {
                let persistence = InMemoryPersistence::new();
                let outcome = dialogs::run_turn(move || echo(message.clone()), &persistence, None, no_fallback()).expect("echo dialog failed");
                match outcome {
                    TurnOutcome::Done { messages, .. } => messages.into_iter().next().expect("echo dialog produced no message"),
                    TurnOutcome::Pending { .. } => panic!("echo dialog should complete in a single turn"),
                }
            })
        })
        .collect();

    let results: Vec<String> = handles.into_iter().map(|handle| handle.join().expect("echo thread panicked")).collect();
    assert_eq!(results, inputs);
}
