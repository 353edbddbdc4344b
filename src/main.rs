use std::{fs, sync::Arc};

use quiz_tiers::config::EngineConfig;
use quiz_tiers::quiz::{
    editor::QuizEditor,
    notify::NotificationFanout,
    reconcile::Reconciler,
    session::{CommitOutcome, SessionEngine},
    store::{Clock, ContentStore, MemoryStore, NotificationSink, SystemClock},
    Question, Role, Tier, UserProfile,
};

type MainResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const LEARNER: &str = "learner-1";

#[tokio::main]
async fn main() -> MainResult {
    let config = EngineConfig::from_env()?;
    pretty_env_logger::init();
    log::info!("Starting quiz engine driver...");

    let store = Arc::new(match &config.seed_file {
        Some(path) => {
            log::info!("Seeding store from {}", path.display());
            MemoryStore::from_quizzes_json(&fs::read_to_string(path)?, config.max_answer_len)?
        }
        None => MemoryStore::new(),
    });
    store
        .add_user(UserProfile::new(LEARNER, "learner@example.com", Role::Learner))
        .await;
    store
        .add_user(UserProfile::new("editor-1", "editor@example.com", Role::Editor))
        .await;

    let content: Arc<dyn ContentStore> = store.clone();
    let sink: Arc<dyn NotificationSink> = store.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let fanout = NotificationFanout::new(content.clone(), sink, clock.clone());
    let reconciler = Reconciler::new(content.clone(), fanout.clone());
    let editor = QuizEditor::new(content.clone(), reconciler, clock.clone(), &config);
    let sessions = SessionEngine::new(content.clone(), fanout, clock, &config);

    if content.get_quiz(Tier::Easy).await?.is_none() {
        let receipt = editor.save_quiz(Tier::Easy, sample_questions()).await?;
        if let Some(reconciliation) = receipt.reconciliation {
            reconciliation.await?;
        }
    }

    let mut session = sessions.open_tier(LEARNER, Tier::Easy).await?;
    println!("Session on {} ({:?}), {} questions", session.tier(), session.origin(), session.total());
    while let Some(question) = session.current_question().cloned() {
        println!("{}  [{}]", question.text, question.shuffled_options().join(" / "));
        match sessions
            .commit_answer(&mut session, &question.id, &question.correct_answer)
            .await?
        {
            CommitOutcome::Completed(completion) => {
                println!(
                    "Finished with {}/{} ({:.0}%)",
                    completion.attempt.score, completion.attempt.total, completion.attempt.percentage
                );
            }
            CommitOutcome::Advanced { answer } => {
                println!("{}", if answer.is_correct { "Correct!" } else { "Wrong." });
            }
            CommitOutcome::Ignored => {}
        }
    }
    print_unlocks(&sessions).await?;

    let receipt = editor
        .add_question(
            Tier::Easy,
            Question::new("easy-4", "Opposite of hot?", "cold", vec!["warm".into(), "wet".into()]),
        )
        .await?;
    println!("Edited Easy quiz: {:?}", receipt.classification());
    if let Some(reconciliation) = receipt.reconciliation {
        let report = reconciliation.await?;
        println!(
            "Reconciled: {} attempts and {} sessions cleared, {} learners notified",
            report.deleted_attempts, report.deleted_progress, report.notified
        );
    }
    print_unlocks(&sessions).await?;

    for notification in store.notifications_for(LEARNER).await {
        println!("[{}] {}: {}", notification.category.tag(), notification.title, notification.body);
    }
    Ok(())
}

async fn print_unlocks(sessions: &SessionEngine) -> MainResult {
    for (tier, state) in sessions.unlock_states(LEARNER).await?.iter() {
        println!("  {tier}: {state:?}");
    }
    Ok(())
}

fn sample_questions() -> Vec<Question> {
    vec![
        Question::new("easy-1", "2 + 2 = ?", "4", vec!["3".into(), "5".into()]),
        Question::new("easy-2", "Colour of the sky?", "blue", vec!["green".into()]),
        Question::new(
            "easy-3",
            "Largest planet?",
            "Jupiter",
            vec!["Mars".into(), "Venus".into(), "Earth".into()],
        ),
    ]
}
