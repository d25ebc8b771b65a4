use cardrank_core::db::open_db_in_memory;
use cardrank_core::rank::lexorank::{validate_rank_order, Rank, RankError, RankSpace, INITIAL_RANK};
use cardrank_core::{
    BoardService, Card, CardId, CardList, CardService, CardServiceError, InvalidMoveReason,
    ListId, MoveOutcome, MoveRequest,
};
use rusqlite::Connection;

type RowSnapshot = (String, String, String, i64, Option<i64>);

fn setup(list_count: usize) -> (Connection, Vec<CardList>) {
    let mut conn = open_db_in_memory().unwrap();
    let mut boards = BoardService::new(&mut conn);
    let board = boards.create_board("Sprint", None).unwrap();
    let lists = (0..list_count)
        .map(|index| {
            boards
                .create_list(board.board_uuid, format!("List {index}"), None)
                .unwrap()
        })
        .collect();
    (conn, lists)
}

fn create(conn: &mut Connection, list_uuid: ListId, title: &str) -> Card {
    CardService::new(conn)
        .create_card(list_uuid, title, None, None)
        .unwrap()
}

fn move_card(
    conn: &mut Connection,
    card: &Card,
    target_list_uuid: ListId,
    before_card_uuid: Option<CardId>,
    after_card_uuid: Option<CardId>,
) -> MoveOutcome {
    CardService::new(conn)
        .move_card(&MoveRequest {
            card_uuid: card.card_uuid,
            target_list_uuid,
            before_card_uuid,
            after_card_uuid,
            expected_version: card.version,
        })
        .unwrap()
}

fn titles(conn: &mut Connection, list_uuid: ListId) -> Vec<String> {
    CardService::new(conn)
        .cards_in_list(list_uuid)
        .unwrap()
        .into_iter()
        .map(|card| card.title)
        .collect()
}

fn snapshot(conn: &Connection) -> Vec<RowSnapshot> {
    let mut stmt = conn
        .prepare(
            "SELECT card_uuid, list_uuid, rank, version, deleted_at
             FROM cards
             ORDER BY card_uuid;",
        )
        .unwrap();
    stmt.query_map([], |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    })
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

fn set_rank(conn: &Connection, card: &Card, rank: &str) {
    conn.execute(
        "UPDATE cards SET rank = ?2 WHERE card_uuid = ?1;",
        [card.card_uuid.to_string(), rank.to_string()],
    )
    .unwrap();
}

fn expect_success(outcome: MoveOutcome) -> Card {
    match outcome {
        MoveOutcome::Success { card } => card,
        other => panic!("expected success, got {other:?}"),
    }
}

fn expect_invalid(outcome: MoveOutcome) -> InvalidMoveReason {
    match outcome {
        MoveOutcome::InvalidRequest { reason } => reason,
        other => panic!("expected invalid request, got {other:?}"),
    }
}

#[test]
fn first_card_gets_initial_rank_and_appends_sort_after_it() {
    let (mut conn, lists) = setup(1);
    let first = create(&mut conn, lists[0].list_uuid, "first");
    let second = create(&mut conn, lists[0].list_uuid, "second");

    assert_eq!(first.rank.as_str(), INITIAL_RANK);
    assert!(second.rank > first.rank);
    assert_eq!(first.version, 1);
}

#[test]
fn inserting_around_single_card_lands_on_either_side() {
    let (mut conn, lists) = setup(2);
    let anchor = create(&mut conn, lists[0].list_uuid, "anchor");
    let front = create(&mut conn, lists[1].list_uuid, "front");
    let back = create(&mut conn, lists[1].list_uuid, "back");
    assert_eq!(anchor.rank.as_str(), "n");

    let front = expect_success(move_card(
        &mut conn,
        &front,
        lists[0].list_uuid,
        None,
        Some(anchor.card_uuid),
    ));
    assert!(front.rank < anchor.rank);

    let back = expect_success(move_card(
        &mut conn,
        &back,
        lists[0].list_uuid,
        Some(anchor.card_uuid),
        None,
    ));
    assert!(back.rank > anchor.rank);

    assert_eq!(titles(&mut conn, lists[0].list_uuid), ["front", "anchor", "back"]);
    assert!(titles(&mut conn, lists[1].list_uuid).is_empty());
}

#[test]
fn successful_move_bumps_version_and_persists_target_list() {
    let (mut conn, lists) = setup(2);
    let card = create(&mut conn, lists[0].list_uuid, "task");

    let moved = expect_success(move_card(&mut conn, &card, lists[1].list_uuid, None, None));
    assert_eq!(moved.version, card.version + 1);
    assert_eq!(moved.list_uuid, lists[1].list_uuid);
    assert_eq!(moved.rank.as_str(), INITIAL_RANK);

    let stored = CardService::new(&mut conn).get_card(card.card_uuid).unwrap();
    assert_eq!(stored, moved);
}

#[test]
fn reorder_within_list_moves_card_to_front() {
    let (mut conn, lists) = setup(1);
    let list_uuid = lists[0].list_uuid;
    let a = create(&mut conn, list_uuid, "a");
    create(&mut conn, list_uuid, "b");
    let c = create(&mut conn, list_uuid, "c");

    expect_success(move_card(&mut conn, &c, list_uuid, None, Some(a.card_uuid)));
    assert_eq!(titles(&mut conn, list_uuid), ["c", "a", "b"]);
}

#[test]
fn stale_version_returns_conflict_without_writing() {
    let (mut conn, lists) = setup(2);
    let card = create(&mut conn, lists[0].list_uuid, "task");
    expect_success(move_card(&mut conn, &card, lists[1].list_uuid, None, None));
    let before = snapshot(&conn);

    // `card` still carries version 1.
    let outcome = move_card(&mut conn, &card, lists[0].list_uuid, None, None);
    assert_eq!(outcome, MoveOutcome::Conflict { current_version: 2 });
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn replaying_an_applied_move_is_a_conflict() {
    let (mut conn, lists) = setup(2);
    let card = create(&mut conn, lists[0].list_uuid, "task");
    let request = MoveRequest {
        card_uuid: card.card_uuid,
        target_list_uuid: lists[1].list_uuid,
        before_card_uuid: None,
        after_card_uuid: None,
        expected_version: card.version,
    };

    let mut service = CardService::new(&mut conn);
    assert!(service.move_card(&request).unwrap().is_success());
    assert_eq!(
        service.move_card(&request).unwrap(),
        MoveOutcome::Conflict { current_version: 2 }
    );
}

#[test]
fn neighbor_from_other_list_is_rejected_and_nothing_changes() {
    let (mut conn, lists) = setup(3);
    let mover = create(&mut conn, lists[0].list_uuid, "mover");
    let stranger = create(&mut conn, lists[1].list_uuid, "stranger");
    let before = snapshot(&conn);

    let reason = expect_invalid(move_card(
        &mut conn,
        &mover,
        lists[2].list_uuid,
        Some(stranger.card_uuid),
        None,
    ));
    assert_eq!(
        reason,
        InvalidMoveReason::NeighborInOtherList {
            card_uuid: stranger.card_uuid,
            list_uuid: lists[1].list_uuid,
        }
    );
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn rejected_request_is_rejected_again_on_replay() {
    let (mut conn, lists) = setup(2);
    let mover = create(&mut conn, lists[0].list_uuid, "mover");
    let stranger = create(&mut conn, lists[1].list_uuid, "stranger");
    let request = MoveRequest {
        card_uuid: mover.card_uuid,
        target_list_uuid: lists[0].list_uuid,
        before_card_uuid: Some(stranger.card_uuid),
        after_card_uuid: None,
        expected_version: mover.version,
    };

    let mut service = CardService::new(&mut conn);
    let first = service.move_card(&request).unwrap();
    let second = service.move_card(&request).unwrap();
    assert!(matches!(first, MoveOutcome::InvalidRequest { .. }));
    assert_eq!(first, second);
}

#[test]
fn non_adjacent_neighbors_are_rejected() {
    let (mut conn, lists) = setup(1);
    let list_uuid = lists[0].list_uuid;
    let a = create(&mut conn, list_uuid, "a");
    create(&mut conn, list_uuid, "b");
    let c = create(&mut conn, list_uuid, "c");
    let mover = create(&mut conn, list_uuid, "mover");
    let before = snapshot(&conn);

    let reason = expect_invalid(move_card(
        &mut conn,
        &mover,
        list_uuid,
        Some(a.card_uuid),
        Some(c.card_uuid),
    ));
    assert!(matches!(reason, InvalidMoveReason::NotAdjacent { .. }));

    // Reversed order is not adjacent either.
    let reason = expect_invalid(move_card(
        &mut conn,
        &mover,
        list_uuid,
        Some(c.card_uuid),
        Some(a.card_uuid),
    ));
    assert!(matches!(reason, InvalidMoveReason::NotAdjacent { .. }));
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn open_ends_must_match_list_boundaries() {
    let (mut conn, lists) = setup(1);
    let list_uuid = lists[0].list_uuid;
    let a = create(&mut conn, list_uuid, "a");
    create(&mut conn, list_uuid, "b");
    let mover = create(&mut conn, list_uuid, "mover");

    // "end of list" while the list has other cards.
    let reason = expect_invalid(move_card(&mut conn, &mover, list_uuid, None, None));
    assert!(matches!(reason, InvalidMoveReason::NotAdjacent { .. }));

    // `a` is not the last card, so it cannot precede an open end.
    let reason = expect_invalid(move_card(&mut conn, &mover, list_uuid, Some(a.card_uuid), None));
    assert!(matches!(reason, InvalidMoveReason::NotAdjacent { .. }));
}

#[test]
fn moving_to_end_of_own_list_excludes_the_mover_from_siblings() {
    let (mut conn, lists) = setup(1);
    let list_uuid = lists[0].list_uuid;
    let a = create(&mut conn, list_uuid, "a");
    let b = create(&mut conn, list_uuid, "b");

    let moved = expect_success(move_card(&mut conn, &a, list_uuid, Some(b.card_uuid), None));
    assert!(moved.rank > b.rank);
    assert_eq!(titles(&mut conn, list_uuid), ["b", "a"]);
}

#[test]
fn card_cannot_be_its_own_neighbor() {
    let (mut conn, lists) = setup(1);
    let card = create(&mut conn, lists[0].list_uuid, "solo");

    let reason = expect_invalid(move_card(
        &mut conn,
        &card,
        lists[0].list_uuid,
        Some(card.card_uuid),
        None,
    ));
    assert_eq!(
        reason,
        InvalidMoveReason::SelfNeighbor {
            card_uuid: card.card_uuid
        }
    );
}

#[test]
fn unknown_card_and_unknown_list_are_invalid_requests() {
    let (mut conn, lists) = setup(1);
    let card = create(&mut conn, lists[0].list_uuid, "task");

    let ghost = Card {
        card_uuid: uuid::Uuid::new_v4(),
        ..card.clone()
    };
    let reason = expect_invalid(move_card(&mut conn, &ghost, lists[0].list_uuid, None, None));
    assert_eq!(
        reason,
        InvalidMoveReason::UnknownCard {
            card_uuid: ghost.card_uuid
        }
    );

    let missing_list = uuid::Uuid::new_v4();
    let reason = expect_invalid(move_card(&mut conn, &card, missing_list, None, None));
    assert_eq!(
        reason,
        InvalidMoveReason::UnknownList {
            list_uuid: missing_list
        }
    );
}

#[test]
fn soft_deleted_list_and_neighbor_are_unknown() {
    let (mut conn, lists) = setup(2);
    let card = create(&mut conn, lists[0].list_uuid, "task");
    let gone = create(&mut conn, lists[0].list_uuid, "gone");
    CardService::new(&mut conn).delete_card(gone.card_uuid).unwrap();

    let reason = expect_invalid(move_card(
        &mut conn,
        &card,
        lists[0].list_uuid,
        Some(gone.card_uuid),
        None,
    ));
    assert_eq!(
        reason,
        InvalidMoveReason::UnknownNeighbor {
            card_uuid: gone.card_uuid
        }
    );

    BoardService::new(&mut conn)
        .delete_list(lists[1].list_uuid)
        .unwrap();
    let reason = expect_invalid(move_card(&mut conn, &card, lists[1].list_uuid, None, None));
    assert!(matches!(reason, InvalidMoveReason::UnknownList { .. }));
}

#[test]
fn deleted_card_cannot_be_moved() {
    let (mut conn, lists) = setup(1);
    let card = create(&mut conn, lists[0].list_uuid, "task");
    CardService::new(&mut conn).delete_card(card.card_uuid).unwrap();

    let reason = expect_invalid(move_card(&mut conn, &card, lists[0].list_uuid, None, None));
    assert!(matches!(reason, InvalidMoveReason::UnknownCard { .. }));
}

#[test]
fn exhausted_seam_rebalances_list_and_retries() {
    let (mut conn, lists) = setup(2);
    let list_uuid = lists[0].list_uuid;
    let left = create(&mut conn, list_uuid, "left");
    let right = create(&mut conn, list_uuid, "right");
    let mover = create(&mut conn, lists[1].list_uuid, "mover");

    // No key sorts strictly between "n" and "na".
    set_rank(&conn, &left, "n");
    set_rank(&conn, &right, "na");

    let moved = expect_success(move_card(
        &mut conn,
        &mover,
        list_uuid,
        Some(left.card_uuid),
        Some(right.card_uuid),
    ));
    assert_eq!(moved.version, mover.version + 1);

    let cards = CardService::new(&mut conn).cards_in_list(list_uuid).unwrap();
    let order: Vec<&str> = cards.iter().map(|card| card.title.as_str()).collect();
    assert_eq!(order, ["left", "mover", "right"]);

    let ranks: Vec<Rank> = cards.iter().map(|card| card.rank.clone()).collect();
    assert!(validate_rank_order(&ranks));
    assert_ne!(cards[0].rank.as_str(), "n");

    // Rebalancing rewrites ranks only.
    assert_eq!(cards[0].version, left.version);
    assert_eq!(cards[2].version, right.version);
}

#[test]
fn conflict_on_exhausted_seam_leaves_ranks_untouched() {
    let (mut conn, lists) = setup(1);
    let list_uuid = lists[0].list_uuid;
    let left = create(&mut conn, list_uuid, "left");
    let right = create(&mut conn, list_uuid, "right");
    set_rank(&conn, &left, "n");
    set_rank(&conn, &right, "na");
    let before = snapshot(&conn);

    let stale = Card {
        version: left.version + 7,
        ..left.clone()
    };
    let outcome = move_card(&mut conn, &stale, list_uuid, None, Some(right.card_uuid));
    assert_eq!(outcome, MoveOutcome::Conflict { current_version: 1 });
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn stale_version_into_deleted_list_is_a_conflict() {
    let (mut conn, lists) = setup(2);
    let card = create(&mut conn, lists[0].list_uuid, "task");
    BoardService::new(&mut conn)
        .delete_list(lists[1].list_uuid)
        .unwrap();

    let stale = Card {
        version: card.version + 1,
        ..card.clone()
    };
    let outcome = move_card(&mut conn, &stale, lists[1].list_uuid, None, None);
    assert_eq!(
        outcome,
        MoveOutcome::Conflict {
            current_version: card.version
        }
    );
}

#[test]
fn failed_rebalance_is_an_error_and_writes_nothing() {
    let (mut conn, lists) = setup(2);
    let list_uuid = lists[0].list_uuid;
    let crowd: Vec<Card> = (0..30)
        .map(|index| create(&mut conn, list_uuid, &format!("card-{index}")))
        .collect();
    let mover = create(&mut conn, lists[1].list_uuid, "mover");
    set_rank(&conn, &crowd[0], "n");
    set_rank(&conn, &crowd[1], "na");
    let before = snapshot(&conn);

    // Thirty keys need width 3 plus one digit of headroom: more than 3.
    let err = CardService::with_rank_space(&mut conn, RankSpace::new(3))
        .move_card(&MoveRequest {
            card_uuid: mover.card_uuid,
            target_list_uuid: list_uuid,
            before_card_uuid: Some(crowd[0].card_uuid),
            after_card_uuid: Some(crowd[1].card_uuid),
            expected_version: mover.version,
        })
        .unwrap_err();
    assert!(
        matches!(
            err,
            CardServiceError::Rank(RankError::RebalanceFailure {
                item_count: 30,
                max_rank_length: 3
            })
        ),
        "unexpected error: {err}"
    );
    assert!(!err.is_retryable());
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn initial_rank_query_commits_tail_rebalance_without_reserving() {
    let (mut conn, lists) = setup(1);
    let list_uuid = lists[0].list_uuid;
    create(&mut conn, list_uuid, "head");
    let tail = create(&mut conn, list_uuid, "tail");
    // Appending after "zzz" needs four digits.
    set_rank(&conn, &tail, "zzz");

    let mut service = CardService::with_rank_space(&mut conn, RankSpace::new(3));
    let rank = service.create_initial_rank(list_uuid).unwrap();

    let cards = service.cards_in_list(list_uuid).unwrap();
    assert_ne!(cards[1].rank.as_str(), "zzz");
    assert!(rank > cards[1].rank);
    assert!(rank.len() <= 3);
    assert_eq!(service.create_initial_rank(list_uuid).unwrap(), rank);

    let appended = service.create_card(list_uuid, "next", None, None).unwrap();
    assert_eq!(appended.rank, rank);
}

#[test]
fn long_run_of_front_inserts_keeps_order() {
    let (mut conn, lists) = setup(2);
    let target = lists[0].list_uuid;
    let mut head = create(&mut conn, target, "card-0");

    for index in 1..60 {
        let card = create(&mut conn, lists[1].list_uuid, &format!("card-{index}"));
        head = expect_success(move_card(&mut conn, &card, target, None, Some(head.card_uuid)));
    }

    let cards = CardService::new(&mut conn).cards_in_list(target).unwrap();
    assert_eq!(cards.len(), 60);
    assert_eq!(cards[0].title, "card-59");
    assert_eq!(cards[59].title, "card-0");
    let ranks: Vec<Rank> = cards.iter().map(|card| card.rank.clone()).collect();
    assert!(validate_rank_order(&ranks));
    assert!(cards.iter().all(|card| card.rank.len() <= 10));
}
