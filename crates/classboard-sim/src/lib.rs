//! Classroom session simulator.
//!
//! Drives one authority and several participants through a short lesson on a
//! shared in-memory room with a simulated clock.

use classboard_core::{
    Instant, MemoryPeer, MemoryRoom, Record, RecordId, RecordStore, Role, SyncConfig, SyncEngine, SyncError,
    SyncStats, Transport,
};
use std::time::Duration;
use thiserror::Error;

type Engine = SyncEngine<RecordStore, MemoryPeer>;

/// Simulated event loop turn.
const STEP: Duration = Duration::from_millis(20);

const ROOM_ID: &str = "lesson";

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Outcome of a simulated lesson.
#[derive(Debug, Clone)]
pub struct LessonReport {
    pub records: usize,
    pub converged: bool,
    pub rejected_edits: usize,
    pub stats: Vec<(String, SyncStats)>,
}

/// A host and its students sharing one room.
pub struct Classroom {
    room: MemoryRoom,
    host: Engine,
    students: Vec<Engine>,
    now: Instant,
}

impl Classroom {
    pub fn new(config: SyncConfig, student_count: usize) -> Self {
        let room = MemoryRoom::new();
        let host = SyncEngine::new(config.clone(), Role::Authority, ROOM_ID, RecordStore::new(), room.connect("professor"));
        let students = (0..student_count)
            .map(|i| {
                let identity = format!("student-{}", i + 1);
                SyncEngine::new(config.clone(), Role::Participant, ROOM_ID, RecordStore::new(), room.connect(&identity))
            })
            .collect();
        Self {
            room,
            host,
            students,
            now: Instant::now(),
        }
    }

    pub fn room(&self) -> &MemoryRoom {
        &self.room
    }

    pub fn host(&self) -> &Engine {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Engine {
        &mut self.host
    }

    pub fn students(&self) -> &[Engine] {
        &self.students
    }

    pub fn student_mut(&mut self, index: usize) -> Option<&mut Engine> {
        self.students.get_mut(index)
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    fn engines_mut(&mut self) -> impl Iterator<Item = &mut Engine> {
        std::iter::once(&mut self.host).chain(self.students.iter_mut())
    }

    /// Everyone opens the whiteboard.
    pub fn open(&mut self) -> Result<(), SyncError> {
        let now = self.now;
        for engine in self.engines_mut() {
            engine.open(now)?;
        }
        Ok(())
    }

    /// Run event loop turns until `duration` has elapsed.
    pub fn advance(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.now += STEP;
            let now = self.now;
            for engine in self.engines_mut() {
                engine.tick(now);
            }
            for engine in self.engines_mut() {
                for envelope in engine.transport().drain() {
                    engine.handle_payload(&envelope.payload, &envelope.sender, now);
                }
                for notice in engine.take_notices() {
                    log::info!("[{}] {}", engine.transport().local_identity(), notice);
                }
            }
        }
    }

    /// Whether every participant holds the host's document.
    pub fn converged(&self) -> bool {
        let reference = self.host.surface().snapshot();
        self.students.iter().all(|s| s.surface().snapshot() == reference)
    }

    fn report(&self, rejected_edits: usize) -> LessonReport {
        let stats = std::iter::once(&self.host)
            .chain(self.students.iter())
            .map(|e| (e.transport().local_identity().to_string(), e.stats()))
            .collect();
        LessonReport {
            records: self.host.surface().len(),
            converged: self.converged(),
            rejected_edits,
            stats,
        }
    }
}

fn stroke(id: &str, x: i64, y: i64) -> Record {
    Record::new(id)
        .with_field("typeName", "shape")
        .with_field("type", "draw")
        .with_field("x", x)
        .with_field("y", y)
}

/// Play a short lesson: the professor draws, opens the board to the class,
/// every student adds a stroke, then the board is locked again.
pub fn run_lesson(config: SyncConfig, student_count: usize) -> Result<LessonReport, SimError> {
    let settle = config.settle_delay();
    let mut class = Classroom::new(config, student_count);
    class.open()?;
    class.advance(settle + STEP);

    for i in 0..3 {
        let now = class.now();
        class.host_mut().put_local(stroke(&format!("shape:prof-{}", i), i * 40, 10), now)?;
        class.advance(Duration::from_millis(100));
    }

    class.host_mut().toggle_permission()?;
    class.advance(Duration::from_millis(100));

    for i in 0..student_count {
        let now = class.now();
        if let Some(student) = class.student_mut(i) {
            student.put_local(stroke(&format!("shape:student-{}", i + 1), i as i64 * 30, 200), now)?;
        }
        class.advance(Duration::from_millis(100));
    }

    class.host_mut().toggle_permission()?;
    class.advance(Duration::from_millis(100));

    let mut rejected_edits = 0;
    for i in 0..student_count {
        let now = class.now();
        if let Some(student) = class.student_mut(i) {
            match student.remove_local([RecordId::from("shape:prof-0")], now) {
                Err(SyncError::ReadOnly) => rejected_edits += 1,
                other => other?,
            }
        }
    }
    class.advance(Duration::from_millis(200));

    Ok(class.report(rejected_edits))
}
