use super::*;
use crate::config::SeedAccount;
use crate::identity::Role;
use crate::store::MemoryStore;

fn owner_seed() -> Vec<SeedAccount> {
    vec![SeedAccount { identifier: "owner".into(), secret: "owner-pass".into(), role: Role::Owner }]
}

fn lines(reply: Reply) -> Vec<String> {
    match reply {
        Reply::Lines(l) => l,
        Reply::Quit => panic!("unexpected quit"),
    }
}

async fn run(shell: &mut Shell, line: &str) -> Vec<String> {
    lines(shell.run_line(line).await.unwrap_or_else(|e| panic!("{line}: {e:?}")))
}

#[test]
fn words_and_quotes() {
    assert_eq!(split_args(r#"addres 2 "Lecture 1" -"#).unwrap(), vec!["addres", "2", "Lecture 1", "-"]);
    assert_eq!(split_args(r#"dev "" x"#).unwrap(), vec!["dev", "", "x"]);
    assert!(split_args(r#"add "open"#).is_err());
}

#[test]
fn parses_commands() {
    assert_eq!(parse_command("   ").unwrap(), None);
    assert_eq!(parse_command("# note").unwrap(), None);
    assert_eq!(
        parse_command("login 017 secret").unwrap(),
        Some(Command::Login { identifier: "017".into(), secret: "secret".into() })
    );
    assert_eq!(parse_command("use P1").unwrap(), Some(Command::Use(Subject::P1)));
    assert_eq!(
        parse_command("rename 3 Motion in a plane").unwrap(),
        Some(Command::Rename { chapter: 2, name: "Motion in a plane".into() })
    );
    assert_eq!(
        parse_command(r#"addres 1 "Class 1" - https://x.test/a.pdf"#).unwrap(),
        Some(Command::AddResource {
            chapter: 0,
            label: "Class 1".into(),
            vid: None,
            pdf: Some("https://x.test/a.pdf".into()),
        })
    );
    assert_eq!(parse_command("logs").unwrap(), Some(Command::Logs(50)));
    assert_eq!(parse_command("chapters").unwrap(), Some(Command::Chapters(None)));
    assert_eq!(
        parse_command(r#"ask what is "work"?"#).unwrap(),
        Some(Command::Ask(r#"what is "work"?"#.into()))
    );
    assert_eq!(
        parse_command("adduser admin 018 pw").unwrap(),
        Some(Command::AddUser { kind: AccountKind::Admin, identifier: "018".into(), secret: "pw".into() })
    );
    assert_eq!(parse_command("exit").unwrap(), Some(Command::Quit));
}

#[test]
fn rejects_bad_input() {
    assert!(parse_command("show 0").is_err());
    assert!(parse_command("show x").is_err());
    assert!(parse_command("use archive2").is_err());
    assert!(parse_command("adduser tutor a b").is_err());
    assert!(parse_command("frobnicate").unwrap_err().contains("unknown command"));
}

#[tokio::test]
async fn edit_and_browse_a_subject() {
    let store = MemoryStore::new();
    let mut shell = Shell::new(Portal::in_memory(&store, owner_seed()));
    assert_eq!(shell.prompt(), "guest> ");
    assert_eq!(shell.run_line("chapters").await.unwrap_err().code_str(), "no_subject");

    assert_eq!(run(&mut shell, "login owner owner-pass").await, vec!["Signed in as owner (owner)"]);
    assert_eq!(run(&mut shell, "use p1").await, vec!["Physics 1st: 0 chapter(s)"]);
    assert_eq!(shell.prompt(), "owner@academyData/p1> ");

    run(&mut shell, "add Vectors").await;
    run(&mut shell, "add Motion").await;
    let added = run(&mut shell, r#"addres 1 "Lecture 1" https://youtu.be/dQw4w9WgXcQ -"#).await;
    assert_eq!(added, vec!["'Vectors' now has 1 item(s)."]);

    let listing = run(&mut shell, "chapters vec").await.join("\n");
    assert!(listing.contains("Vectors"));
    assert!(!listing.contains("Motion"));
    assert!(run(&mut shell, "show 1").await.join("\n").contains("Lecture 1"));
    assert_eq!(
        run(&mut shell, "watch 1 1").await,
        vec!["https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1&rel=0&modestbranding=1"]
    );
    assert_eq!(shell.run_line("open 1 1").await.unwrap_err().code_str(), "no_document");

    run(&mut shell, "rename 2 Motion in a plane").await;
    run(&mut shell, "stash 1").await;
    let listing = run(&mut shell, "chapters").await.join("\n");
    assert!(listing.contains("Motion in a plane"));
    assert!(!listing.contains("Vectors"));

    assert_eq!(run(&mut shell, "archive").await, vec!["Physics 1st (archive): 1 chapter(s)"]);
    assert!(run(&mut shell, "chapters").await.join("\n").contains("Vectors"));
    assert_eq!(run(&mut shell, "delete 1").await, vec!["Deleted 'Vectors'."]);
    assert_eq!(run(&mut shell, "chapters").await, vec!["No chapters."]);

    assert_eq!(run(&mut shell, "logout").await, vec!["Signed out."]);
    assert_eq!(shell.current(), None);
    assert_eq!(run(&mut shell, "whoami").await, vec!["Not signed in."]);
}

#[tokio::test]
async fn students_read_but_cannot_edit() {
    let store = MemoryStore::new();
    let mut owner = Shell::new(Portal::in_memory(&store, owner_seed()));
    run(&mut owner, "login owner owner-pass").await;
    assert!(run(&mut owner, "adduser student 01700000000 pw").await[0].starts_with("Added student"));
    run(&mut owner, "use ict").await;
    run(&mut owner, "add Number systems").await;
    assert!(run(&mut owner, "accounts").await.join("\n").contains("01700000000"));

    let mut student = Shell::new(Portal::in_memory(&store, owner_seed()));
    assert_eq!(run(&mut student, "login 01700000000 pw").await, vec!["Signed in as 01700000000 (student)"]);
    assert_eq!(run(&mut student, "use ict").await, vec!["ICT: 1 chapter(s)"]);
    assert!(student.run_line("add Logic gates").await.unwrap_err().is_permission_denied());
    assert!(student.run_line("delete 1").await.unwrap_err().is_permission_denied());
    assert!(student.run_line("accounts").await.unwrap_err().is_permission_denied());
    assert!(student.run_line("logs").await.unwrap_err().is_permission_denied());
    assert!(student.run_line("dev Someone else").await.unwrap_err().is_permission_denied());
    assert_eq!(run(&mut student, "dev").await[0], "(no name)");
}

#[tokio::test]
async fn help_and_quit() {
    let mut shell = Shell::new(Portal::in_memory(&MemoryStore::new(), Vec::new()));
    assert!(run(&mut shell, "help").await.iter().any(|l| l.contains("stash <n>")));
    assert_eq!(shell.run_line("quit").await.unwrap(), Reply::Quit);
    assert_eq!(shell.run_line("login a").await.unwrap_err().code_str(), "bad_command");
    assert_eq!(shell.run_line("subjects").await.map(lines).unwrap().len(), 10 + 5);
}
