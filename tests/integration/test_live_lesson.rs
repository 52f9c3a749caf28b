//! End-to-end tests for live lesson synchronization.
//!
//! A real server is bound on a free port. Teachers are raw WebSocket clients;
//! students run a `StudentFollowController` that reacts to relay events the
//! way a student app would.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lesson_relay::{
    create_router, AppState, ClientEvent, Config, EndReason, FollowState, ServerEvent,
    StudentFollowController, TeacherId,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns the relay and returns its `host:port`.
async fn spawn_test_server(config: Config) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let router = create_router(AppState::new(config));
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    addr.to_string()
}

async fn connect_as(addr: &str, user_id: &str, role: &str) -> WsClient {
    let url = format!("ws://{addr}/ws?userId={user_id}&role={role}");
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

async fn send_event(client: &mut WsClient, event: &ClientEvent) {
    let json = serde_json::to_string(event).expect("Failed to serialize event");
    client
        .send(Message::Text(json))
        .await
        .expect("Failed to send event");
}

/// Receives the next relay event, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> ServerEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Asserts that nothing arrives within a short window.
async fn assert_silent(client: &mut WsClient) {
    if let Ok(Some(Ok(Message::Text(text)))) =
        timeout(Duration::from_millis(200), client.next()).await
    {
        panic!("Expected no event, got: {text}");
    }
}

// ============================================================================
// Participants
// ============================================================================

struct Teacher {
    ws: WsClient,
}

impl Teacher {
    async fn connect(addr: &str, user_id: &str) -> Self {
        Self {
            ws: connect_as(addr, user_id, "teacher").await,
        }
    }

    async fn send(&mut self, event: ClientEvent) {
        send_event(&mut self.ws, &event).await;
    }

    async fn next(&mut self) -> ServerEvent {
        receive_event(&mut self.ws).await
    }

    async fn start(&mut self, lesson_id: &str, total_steps: u32) {
        self.send(ClientEvent::start_lesson(lesson_id, "Lesson", total_steps))
            .await;
        let event = self.next().await;
        assert!(
            matches!(&event, ServerEvent::LessonStarted(p) if p.lesson_id.as_str() == lesson_id),
            "Expected lesson:started, got: {event:?}"
        );
    }

    async fn set_step(&mut self, lesson_id: &str, step: u32) {
        self.send(ClientEvent::set_step(lesson_id, step)).await;
        let event = self.next().await;
        assert!(
            matches!(&event, ServerEvent::StepChanged(p) if p.step == step),
            "Expected lesson:step_changed, got: {event:?}"
        );
    }
}

struct Student {
    ws: WsClient,
    follower: StudentFollowController,
}

impl Student {
    async fn connect(addr: &str, user_id: &str) -> Self {
        Self {
            ws: connect_as(addr, user_id, "student").await,
            follower: StudentFollowController::new(),
        }
    }

    async fn subscribe(&mut self, teacher_id: &str) {
        let command = self.follower.subscribe(TeacherId::new(teacher_id));
        send_event(&mut self.ws, &command).await;
        self.wait_for(|e| matches!(e, ServerEvent::SubscriptionConfirmed(_)))
            .await;
    }

    /// Receives one event, feeds it to the follower and sends its command.
    async fn next(&mut self) -> ServerEvent {
        let event = receive_event(&mut self.ws).await;
        let reaction = self.follower.handle(&event);
        if let Some(command) = reaction.command {
            send_event(&mut self.ws, &command).await;
        }
        event
    }

    async fn wait_for(&mut self, matches: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let event = self.next().await;
            if matches(&event) {
                return event;
            }
        }
    }

    async fn wait_until_following(&mut self) {
        while self.follower.state() != FollowState::Following {
            self.next().await;
        }
    }

    async fn wait_for_step(&mut self, step: u32) {
        while self.follower.current_step() != Some(step) {
            self.next().await;
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// Student subscribes first, then follows the lesson as it starts and moves.
#[tokio::test]
async fn test_student_follows_lesson_started_after_subscribe() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;

    student.subscribe("frizzle").await;
    assert_eq!(student.follower.state(), FollowState::Subscribed);

    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;
    assert_eq!(student.follower.current_step(), Some(1));

    teacher.set_step("algebra-1", 2).await;
    student.wait_for_step(2).await;

    let known = student.follower.known_session().expect("following");
    assert_eq!(known.lesson_id.as_str(), "algebra-1");
    assert_eq!(known.total_steps, 6);
    assert_eq!(known.room_id.as_str(), "frizzle:algebra-1");
}

/// A student joining mid-lesson lands on the current step, not step one.
#[tokio::test]
async fn test_late_joiner_lands_on_current_step() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    teacher.start("algebra-1", 6).await;
    teacher.set_step("algebra-1", 2).await;
    teacher.set_step("algebra-1", 3).await;

    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    student
        .wait_for(|e| matches!(e, ServerEvent::LessonState(_)))
        .await;

    assert_eq!(student.follower.state(), FollowState::Following);
    assert_eq!(student.follower.current_step(), Some(3));

    teacher.set_step("algebra-1", 4).await;
    student.wait_for_step(4).await;
}

/// Restarting with a new lesson ends the old one and moves followers over.
#[tokio::test]
async fn test_restart_moves_followers_to_new_lesson() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;
    teacher.set_step("algebra-1", 5).await;
    student.wait_for_step(5).await;

    teacher
        .send(ClientEvent::start_lesson("geometry-2", "Angles", 4))
        .await;
    let ended = teacher.next().await;
    assert!(
        matches!(&ended, ServerEvent::LessonEnded(p) if p.reason == EndReason::Superseded),
        "Expected superseded end, got: {ended:?}"
    );

    let ended = student
        .wait_for(|e| matches!(e, ServerEvent::LessonEnded(_)))
        .await;
    assert!(matches!(ended, ServerEvent::LessonEnded(p) if p.lesson_id.as_str() == "algebra-1"));

    student
        .wait_for(|e| matches!(e, ServerEvent::LessonState(_)))
        .await;
    let known = student.follower.known_session().expect("following");
    assert_eq!(known.lesson_id.as_str(), "geometry-2");
    assert_eq!(known.current_step, 1);
    assert_eq!(known.total_steps, 4);
}

/// A teacher who vanishes takes the lesson down after the grace period.
#[tokio::test]
async fn test_teacher_disconnect_ends_lesson_after_grace() {
    let config = Config {
        grace_period_secs: 1,
        ..Config::default()
    };
    let addr = spawn_test_server(config).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;

    teacher.ws.close(None).await.expect("Failed to close");
    drop(teacher);

    let ended = student
        .wait_for(|e| matches!(e, ServerEvent::LessonEnded(_)))
        .await;
    assert!(
        matches!(&ended, ServerEvent::LessonEnded(p) if p.reason == EndReason::Disconnected),
        "Expected disconnected end, got: {ended:?}"
    );
    assert_eq!(student.follower.state(), FollowState::Subscribed);

    let response = reqwest::get(format!("http://{addr}/api/sessions/frizzle"))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

/// A teacher reconnecting inside the grace period keeps the lesson going.
#[tokio::test]
async fn test_teacher_reconnect_within_grace_resumes() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;
    teacher.set_step("algebra-1", 3).await;
    student.wait_for_step(3).await;

    teacher.ws.close(None).await.expect("Failed to close");
    drop(teacher);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let state = teacher.next().await;
    assert!(
        matches!(&state, ServerEvent::LessonState(s) if s.current_step == 3),
        "Expected lesson:state, got: {state:?}"
    );

    teacher.set_step("algebra-1", 4).await;
    student.wait_for_step(4).await;
    assert_eq!(student.follower.state(), FollowState::Following);
}

#[tokio::test]
async fn test_explicit_end_confirms_and_releases_followers() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;

    teacher.send(ClientEvent::EndLesson).await;
    let confirmed = teacher.next().await;
    assert!(matches!(confirmed, ServerEvent::EndConfirmed(_)));

    student
        .wait_for(|e| matches!(e, ServerEvent::EndConfirmed(_)))
        .await;
    assert_eq!(student.follower.state(), FollowState::Subscribed);

    // Ending again is a no-op
    teacher.send(ClientEvent::EndLesson).await;
    assert_silent(&mut teacher.ws).await;
}

// ============================================================================
// Boundary Errors
// ============================================================================

#[tokio::test]
async fn test_out_of_range_step_is_reported_to_teacher_only() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;

    teacher.send(ClientEvent::set_step("algebra-1", 7)).await;
    let error = teacher.next().await;
    assert!(
        matches!(&error, ServerEvent::Error(p) if p.code == "step_out_of_range"),
        "Expected step_out_of_range, got: {error:?}"
    );

    assert_silent(&mut student.ws).await;
    assert_eq!(student.follower.current_step(), Some(1));
}

#[tokio::test]
async fn test_student_cannot_drive_lesson() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;
    let mut student = Student::connect(&addr, "arnold").await;
    student.subscribe("frizzle").await;
    teacher.start("algebra-1", 6).await;
    student.wait_until_following().await;

    send_event(&mut student.ws, &ClientEvent::set_step("algebra-1", 4)).await;
    let error = student
        .wait_for(|e| matches!(e, ServerEvent::Error(_)))
        .await;
    assert!(matches!(error, ServerEvent::Error(p) if p.code == "unauthorized"));

    assert_silent(&mut teacher.ws).await;
    assert_eq!(student.follower.current_step(), Some(1));
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_socket_stays_open() {
    let addr = spawn_test_server(Config::default()).await;
    let mut teacher = Teacher::connect(&addr, "frizzle").await;

    teacher
        .ws
        .send(Message::Text("{\"event\":\"teacher:dance\"}".to_string()))
        .await
        .expect("Failed to send");
    let error = teacher.next().await;
    assert!(matches!(error, ServerEvent::Error(p) if p.code == "invalid_event"));

    teacher.start("algebra-1", 6).await;
}

#[tokio::test]
async fn test_two_teachers_do_not_cross_talk() {
    let addr = spawn_test_server(Config::default()).await;
    let mut frizzle = Teacher::connect(&addr, "frizzle").await;
    let mut keating = Teacher::connect(&addr, "keating").await;
    let mut arnold = Student::connect(&addr, "arnold").await;
    let mut todd = Student::connect(&addr, "todd").await;
    arnold.subscribe("frizzle").await;
    todd.subscribe("keating").await;

    frizzle.start("algebra-1", 6).await;
    keating.start("poetry-1", 3).await;
    arnold.wait_until_following().await;
    todd.wait_until_following().await;

    frizzle.set_step("algebra-1", 5).await;
    arnold.wait_for_step(5).await;

    assert_silent(&mut todd.ws).await;
    assert_eq!(todd.follower.current_step(), Some(1));
    assert_eq!(
        todd.follower.known_session().map(|k| k.lesson_id.as_str().to_string()),
        Some("poetry-1".to_string())
    );
}
