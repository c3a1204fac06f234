use promptparty::config::GameConfig;
use promptparty::coordinator::{Accepted, Coordinator, JoinRequest};
use promptparty::protocol::{ClientMessage, ServerMessage};
use promptparty::types::{GamePhase, Prompts, Question};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Seat {
    accepted: Accepted,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Seat {
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn last(&mut self) -> Option<ServerMessage> {
        self.drain().pop()
    }
}

/// A host plus players attached straight to a coordinator, no sockets.
struct Table {
    coordinator: Coordinator<StdRng>,
    host: Seat,
    players: Vec<Seat>,
}

impl Table {
    fn new(seed: u64, config: GameConfig) -> Self {
        let (mut coordinator, _handle) =
            Coordinator::with_rng(64, config, StdRng::seed_from_u64(seed));
        let (tx, rx) = mpsc::channel(64);
        let accepted = coordinator.accept_host(tx);
        Self {
            coordinator,
            host: Seat { accepted, rx },
            players: Vec::new(),
        }
    }

    fn join(&mut self, name: &str) -> usize {
        let (tx, rx) = mpsc::channel(64);
        let accepted = self
            .coordinator
            .accept_player(
                JoinRequest {
                    name: name.to_string(),
                    ..JoinRequest::default()
                },
                tx,
            )
            .expect("host is connected");
        self.players.push(Seat { accepted, rx });
        self.players.len() - 1
    }

    fn host_sends(&mut self, msg: ClientMessage) {
        let a = self.host.accepted;
        self.coordinator
            .handle_message(a.participant, a.connection, msg);
    }

    fn player_sends(&mut self, seat: usize, msg: ClientMessage) {
        let a = self.players[seat].accepted;
        self.coordinator
            .handle_message(a.participant, a.connection, msg);
    }

    fn drain_all(&mut self) {
        self.host.drain();
        for seat in &mut self.players {
            seat.drain();
        }
    }

    fn ready_all(&mut self) {
        for seat in 0..self.players.len() {
            let id = self.players[seat].accepted.participant;
            self.player_sends(
                seat,
                ClientMessage::Ready {
                    prompts: Prompts {
                        most_likely: format!("Sing at karaoke {}?", id),
                        would_you_rather: format!("swim with seal {}", id),
                        take_a_shot: None,
                        blind_answer: format!("blind {}", id),
                    },
                },
            );
        }
    }

    /// Four players, begun and fully ready. Returns the first question.
    fn started(seed: u64, config: GameConfig) -> (Self, Question) {
        let mut table = Self::new(seed, config);
        for name in ["Alice", "Bob", "Carol", "Dave"] {
            table.join(name);
        }
        table.host_sends(ClientMessage::Begin);
        table.drain_all();
        table.ready_all();

        let question = match table.host.last() {
            Some(ServerMessage::Question { question }) => question,
            other => panic!("Expected first question, got {:?}", other),
        };
        table.drain_all();
        (table, question)
    }
}

/// Index of the option `id` owns, if any.
fn own_option(question: &Question, id: u64) -> Option<usize> {
    question.options.iter().position(|o| o.owner == id)
}

#[test]
fn test_full_game_flow() {
    let (mut table, mut question) = Table::started(7, GameConfig::default());
    let mut expected_points = vec![0u32; 4];
    let mut asked = 1;

    let finish = loop {
        let mut expected_results = vec![0u32; question.options.len()];
        for seat in 0..4 {
            let id = table.players[seat].accepted.participant;
            let choice = match own_option(&question, id) {
                Some(index) => {
                    expected_points[seat] += 1;
                    index
                }
                None => 0,
            };
            expected_results[choice] += 1;
            table.player_sends(seat, ClientMessage::Answer { choice });
        }

        // The last answer reveals without the host timer
        assert_eq!(
            table.host.last(),
            Some(ServerMessage::Results {
                results: expected_results
            })
        );
        assert_eq!(
            table.coordinator.game().map(|g| g.phase()),
            Some(GamePhase::Results)
        );
        table.drain_all();

        table.host_sends(ClientMessage::Next);
        match table.host.last() {
            Some(ServerMessage::Question { question: next }) => {
                question = next;
                asked += 1;
            }
            Some(ServerMessage::Finish { players }) => break players,
            other => panic!("Unexpected message {:?}", other),
        }
        table.drain_all();
    };

    // 4 most-likely, 2 would-you-rather, 1 blind
    assert_eq!(asked, 7);

    // Sorted by points, highest first
    assert!(finish.windows(2).all(|w| w[0].points >= w[1].points));
    for (seat, points) in expected_points.iter().enumerate() {
        let id = table.players[seat].accepted.participant;
        let player = finish.iter().find(|p| p.id == id).unwrap();
        assert_eq!(player.points, *points, "points of {}", player.name);
    }

    // Every player saw the same finish
    table.drain_all();
    table.host_sends(ClientMessage::Next);
    assert_eq!(
        table.host.last(),
        Some(ServerMessage::Finish {
            players: finish.clone()
        })
    );
    assert_eq!(
        table.players[2].last(),
        Some(ServerMessage::Finish { players: finish })
    );
}

#[test]
fn test_timer_reveals_partial_tally() {
    let (mut table, question) = Table::started(3, GameConfig::default());
    table.player_sends(0, ClientMessage::Answer { choice: 1 });
    assert_eq!(table.host.last(), None);

    table.host_sends(ClientMessage::Timer);
    let mut expected = vec![0u32; question.options.len()];
    expected[1] = 1;
    assert_eq!(
        table.host.last(),
        Some(ServerMessage::Results { results: expected })
    );

    // Late answers are refused once revealed
    table.drain_all();
    table.player_sends(1, ClientMessage::Answer { choice: 0 });
    assert!(matches!(
        table.players[1].last(),
        Some(ServerMessage::Error { ref code, .. }) if code == "WRONG_PHASE"
    ));
}

#[test]
fn test_answer_counts_once_per_player() {
    let (mut table, _question) = Table::started(5, GameConfig::default());
    table.player_sends(0, ClientMessage::Answer { choice: 0 });
    table.player_sends(0, ClientMessage::Answer { choice: 0 });

    assert!(matches!(
        table.players[0].last(),
        Some(ServerMessage::Error { ref code, .. }) if code == "ALREADY_ANSWERED"
    ));
    assert_eq!(table.coordinator.game().unwrap().answered_count(), 1);
}

#[test]
fn test_repeat_answers_when_allowed() {
    let config = GameConfig {
        allow_repeat_answers: true,
        ..GameConfig::default()
    };
    let (mut table, _question) = Table::started(5, config);
    for _ in 0..3 {
        table.player_sends(0, ClientMessage::Answer { choice: 0 });
    }
    let game = table.coordinator.game().unwrap();
    assert_eq!(game.answered_count(), 3);
    assert_eq!(game.phase(), GamePhase::Question);
}

#[test]
fn test_disconnect_completes_question() {
    let (mut table, question) = Table::started(9, GameConfig::default());
    for seat in 0..3 {
        table.player_sends(seat, ClientMessage::Answer { choice: 0 });
    }
    assert_eq!(table.host.last(), None);

    let gone = table.players[3].accepted;
    table
        .coordinator
        .disconnect(gone.participant, gone.connection);

    let mut expected = vec![0u32; question.options.len()];
    expected[0] = 3;
    assert_eq!(
        table.host.last(),
        Some(ServerMessage::Results { results: expected })
    );
    assert_eq!(table.coordinator.registry().player_count(), 3);
}

#[test]
fn test_dropped_transport_counts_as_disconnect() {
    let (mut table, _question) = Table::started(9, GameConfig::default());
    for seat in 0..3 {
        table.player_sends(seat, ClientMessage::Answer { choice: 0 });
    }

    // The phone went away without the reader noticing
    let gone = table.players.pop().unwrap();
    drop(gone.rx);

    table.host_sends(ClientMessage::Timer);
    assert!(matches!(
        table.host.last(),
        Some(ServerMessage::Results { .. })
    ));
    assert_eq!(table.coordinator.registry().player_count(), 3);
    assert!(table
        .coordinator
        .registry()
        .player(gone.accepted.participant)
        .is_none());
}

#[test]
fn test_reconnect_keeps_player_record() {
    let (mut table, mut question) = Table::started(13, GameConfig::default());
    let before = table.players[1].accepted;

    // Every other player's most-likely question offers Bob
    let choice = loop {
        if let Some(index) = own_option(&question, before.participant) {
            break index;
        }
        table.host_sends(ClientMessage::Next);
        question = match table.host.last() {
            Some(ServerMessage::Question { question }) => question,
            other => panic!("Ran out of questions: {:?}", other),
        };
    };
    table.player_sends(1, ClientMessage::Answer { choice });
    let record = table
        .coordinator
        .game()
        .unwrap()
        .player(before.participant)
        .unwrap()
        .clone();
    assert_eq!(record.points, 1);
    let question = table.coordinator.game().unwrap().current_question().unwrap().clone();
    table.drain_all();

    table
        .coordinator
        .disconnect(before.participant, before.connection);

    let (tx, rx) = mpsc::channel(64);
    let after = table
        .coordinator
        .accept_player(
            JoinRequest {
                name: "Bob".to_string(),
                user_id: Some(before.participant),
                session_id: Some(before.session_id),
            },
            tx,
        )
        .unwrap();
    let mut seat = Seat { accepted: after, rx };

    assert!(after.reconnected);
    assert_eq!(after.participant, before.participant);
    assert_ne!(after.connection, before.connection);

    let messages = seat.drain();
    assert_eq!(
        messages.first(),
        Some(&ServerMessage::Welcome {
            session_id: before.session_id,
            user_id: before.participant,
        })
    );
    // Caught up with the question in flight
    assert_eq!(
        messages.last(),
        Some(&ServerMessage::Question { question })
    );

    let game = table.coordinator.game().unwrap();
    assert_eq!(game.players().len(), 4);
    let rejoined = game.player(before.participant).unwrap();
    assert!(rejoined.connected);
    assert_eq!(rejoined.name, "Bob");
    assert_eq!(rejoined.points, record.points);
    assert_eq!(rejoined.prompts, record.prompts);
    assert_eq!(
        rejoined.prompts.most_likely,
        format!("Sing at karaoke {}?", before.participant)
    );

    // The vote cast before dropping still counts
    assert_eq!(game.answered_count(), 1);
}

#[test]
fn test_stale_session_gets_fresh_id() {
    let mut table = Table::new(21, GameConfig::default());
    let seat = table.join("Alice");
    let old = table.players[seat].accepted;

    // A new host means a new session
    let (tx, rx) = mpsc::channel(64);
    let host = table.coordinator.accept_host(tx);
    table.host = Seat { accepted: host, rx };
    assert_ne!(host.session_id, old.session_id);

    let (tx, _rx) = mpsc::channel(64);
    let again = table
        .coordinator
        .accept_player(
            JoinRequest {
                name: "Alice".to_string(),
                user_id: Some(old.participant),
                session_id: Some(old.session_id),
            },
            tx,
        )
        .unwrap();

    assert!(!again.reconnected);
    assert_ne!(again.participant, old.participant);
    assert_eq!(again.session_id, host.session_id);
}

#[test]
fn test_players_cannot_drive_the_game() {
    let mut table = Table::new(1, GameConfig::default());
    for name in ["Alice", "Bob", "Carol", "Dave"] {
        table.join(name);
    }
    table.drain_all();

    table.player_sends(0, ClientMessage::Begin);
    assert!(matches!(
        table.players[0].last(),
        Some(ServerMessage::Error { ref code, .. }) if code == "UNAUTHORIZED"
    ));
    assert!(table.coordinator.game().is_none());
}

#[test]
fn test_purge_keeps_host_and_session() {
    let (mut table, _question) = Table::started(2, GameConfig::default());
    let session = table.coordinator.session().unwrap().session_id;

    table.host_sends(ClientMessage::Purge);

    assert_eq!(table.coordinator.registry().player_count(), 0);
    assert!(table.coordinator.game().is_none());
    assert!(table.coordinator.registry().has_host());
    assert_eq!(table.coordinator.session().unwrap().session_id, session);
    for seat in &mut table.players {
        seat.drain();
        assert!(seat.rx.is_closed());
    }
}

#[test]
fn test_begin_again_after_finish() {
    let (mut table, _question) = Table::started(4, GameConfig::default());
    table.host_sends(ClientMessage::Begin);
    assert!(matches!(
        table.host.last(),
        Some(ServerMessage::Error { ref code, .. }) if code == "GAME_IN_PROGRESS"
    ));

    loop {
        table.host_sends(ClientMessage::Next);
        if let Some(ServerMessage::Finish { .. }) = table.host.last() {
            break;
        }
    }

    table.host_sends(ClientMessage::Begin);
    assert!(matches!(
        table.host.last(),
        Some(ServerMessage::Setup { ref players, .. }) if players.len() == 4
    ));
    assert_eq!(
        table.coordinator.game().map(|g| g.phase()),
        Some(GamePhase::Setup)
    );
}

async fn recv(rx: &mut mpsc::Receiver<ServerMessage>) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("message in time")
}

#[tokio::test]
async fn test_coordinator_task_over_handle() {
    let (coordinator, handle) = Coordinator::with_rng(
        32,
        GameConfig::default(),
        StdRng::seed_from_u64(99),
    );
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(coordinator.run(shutdown.clone()));

    let (htx, mut hrx) = mpsc::channel(32);
    let host = handle.connect_host(htx).await.unwrap();

    let (ptx, mut prx) = mpsc::channel(32);
    let player = handle
        .connect_player(
            JoinRequest {
                name: "Alice".to_string(),
                ..JoinRequest::default()
            },
            ptx,
        )
        .await
        .unwrap();
    assert_eq!(player.session_id, host.session_id);

    assert!(matches!(
        recv(&mut hrx).await,
        Some(ServerMessage::Welcome { .. })
    ));
    assert!(matches!(
        recv(&mut hrx).await,
        Some(ServerMessage::Joined { ref player }) if player.name == "Alice"
    ));
    assert!(matches!(
        recv(&mut prx).await,
        Some(ServerMessage::Welcome { user_id, .. }) if user_id == player.participant
    ));

    // Not enough players yet
    handle
        .inbound(host.participant, host.connection, ClientMessage::Begin)
        .unwrap();
    assert!(matches!(
        recv(&mut hrx).await,
        Some(ServerMessage::Error { ref code, .. }) if code == "NOT_ENOUGH_PLAYERS"
    ));

    shutdown.cancel();
    task.await.unwrap();
}
