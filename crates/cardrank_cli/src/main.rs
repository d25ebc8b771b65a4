//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise board/list/card ordering end to end against an in-memory
//!   database and print the resulting order.
//! - Honor `CARDRANK_*` configuration; log to `CARDRANK_LOG_DIR` when set.

use cardrank_core::{
    init_logging_from_config, open_db_in_memory, BoardDetail, BoardService, CardService,
    CoreConfig, MoveOutcome, MoveRequest,
};
use log::info;
use std::error::Error;

const ENV_LOG_DIR: &str = "CARDRANK_LOG_DIR";

fn main() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    if let Ok(log_dir) = std::env::var(ENV_LOG_DIR) {
        init_logging_from_config(&config, log_dir)?;
    }

    println!("cardrank_core ping={}", cardrank_core::ping());
    println!("cardrank_core version={}", cardrank_core::core_version());

    let mut conn = open_db_in_memory()?;
    let mut boards = BoardService::from_config(&mut conn, &config);
    let board = boards.create_board("Demo", Some("ordering walkthrough".to_string()))?;
    let todo = boards.create_list(board.board_uuid, "Todo", None)?;
    let done = boards.create_list(board.board_uuid, "Done", None)?;

    let mut cards = CardService::from_config(&mut conn, &config);
    let first = cards.create_card(todo.list_uuid, "Write parser", None, None)?;
    let second = cards.create_card(todo.list_uuid, "Add tests", None, None)?;
    cards.create_card(todo.list_uuid, "Ship", None, None)?;

    let request = MoveRequest {
        card_uuid: second.card_uuid,
        target_list_uuid: done.list_uuid,
        before_card_uuid: None,
        after_card_uuid: None,
        expected_version: second.version,
    };
    report("move", &cards.move_card(&request)?);
    // Same request again: the version has moved on.
    report("replay", &cards.move_card(&request)?);

    let to_front = MoveRequest {
        card_uuid: first.card_uuid,
        target_list_uuid: done.list_uuid,
        before_card_uuid: None,
        after_card_uuid: Some(second.card_uuid),
        expected_version: first.version,
    };
    report("move", &cards.move_card(&to_front)?);

    let detail = BoardService::from_config(&mut conn, &config).board_detail(board.board_uuid)?;
    print_board(&detail);
    info!("event=cli_demo module=cli status=ok board_uuid={}", board.board_uuid);
    Ok(())
}

fn report(label: &str, outcome: &MoveOutcome) {
    match outcome {
        MoveOutcome::Success { card } => println!(
            "{label}: ok card={} rank={} version={}",
            card.card_uuid, card.rank, card.version
        ),
        MoveOutcome::Conflict { current_version } => {
            println!("{label}: conflict current_version={current_version}")
        }
        MoveOutcome::InvalidRequest { reason } => println!("{label}: rejected {reason}"),
    }
}

fn print_board(detail: &BoardDetail) {
    println!(
        "{} ({})",
        detail.board.name,
        detail.board.description.as_deref().unwrap_or("-")
    );
    for entry in &detail.lists {
        println!("[{}]", entry.list.name);
        for card in &entry.cards {
            println!("  {:<6} v{} {}", card.rank.as_str(), card.version, card.title);
        }
    }
}
