//! SQLite-backed storage for the curriculum roadmap

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::types::{
    ChildTopic, GeneratedContent, Learner, LearnerProfile, MiniUnit, NodeSpec, NodeStatus,
    QuestionResult, QuizAttempt, QuizItem, RoadmapNode, UnitStatus, DEFAULT_UNIT_MINUTES,
};

/// SQLite-based roadmap store
pub struct RoadmapStore {
    conn: Arc<Mutex<Connection>>,
}

impl RoadmapStore {
    /// Open (or create) a store at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(&path)?;

        // Enable WAL mode for better performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store. Used by tests as the substitutable backend.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS learners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                strengths TEXT,
                weaknesses TEXT,
                interests TEXT,
                course TEXT,
                year TEXT,
                created_at TEXT NOT NULL
            );

            -- One row per learner, tracking the topic of the active roadmap
            CREATE TABLE IF NOT EXISTS learning_status (
                learner_id INTEGER PRIMARY KEY,
                current_topic TEXT,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (learner_id) REFERENCES learners(id)
            );

            -- Curriculum forest; parent_id is a self-reference for
            -- remediation children
            CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id INTEGER NOT NULL,
                topic TEXT NOT NULL,
                subtopic TEXT NOT NULL,
                position INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                parent_id INTEGER,
                resources TEXT NOT NULL DEFAULT '[]',
                FOREIGN KEY (learner_id) REFERENCES learners(id),
                FOREIGN KEY (parent_id) REFERENCES nodes(id)
            );

            CREATE TABLE IF NOT EXISTS units (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                estimated_minutes INTEGER NOT NULL DEFAULT 50,
                status TEXT NOT NULL DEFAULT 'pending',
                content_ref INTEGER,
                FOREIGN KEY (node_id) REFERENCES nodes(id),
                FOREIGN KEY (content_ref) REFERENCES content(id)
            );

            -- Generated lesson + quiz; one row per unit, never replaced
            CREATE TABLE IF NOT EXISTS content (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unit_id INTEGER NOT NULL UNIQUE,
                lesson_text TEXT NOT NULL,
                resources TEXT NOT NULL DEFAULT '[]',
                videos TEXT NOT NULL DEFAULT '[]',
                quiz TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY (unit_id) REFERENCES units(id)
            );

            -- Append-only answer log
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id INTEGER NOT NULL,
                unit_id INTEGER NOT NULL,
                question TEXT NOT NULL,
                submitted_answer TEXT,
                is_correct INTEGER NOT NULL,
                difficulty TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (learner_id) REFERENCES learners(id),
                FOREIGN KEY (unit_id) REFERENCES units(id)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_learner_position ON nodes(learner_id, position);
            CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
            CREATE INDEX IF NOT EXISTS idx_units_node ON units(node_id);
            CREATE INDEX IF NOT EXISTS idx_attempts_unit ON attempts(unit_id);
        "#,
        )?;

        Ok(())
    }

    // ============ Learners ============

    /// Create a new learner from a profile
    pub async fn add_learner(&self, profile: &LearnerProfile) -> Result<Learner> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO learners (name, strengths, weaknesses, interests, course, year, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                profile.name,
                profile.strengths,
                profile.weaknesses,
                profile.interests,
                profile.course,
                profile.year,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Learner {
            id,
            name: profile.name.clone(),
            strengths: profile.strengths.clone(),
            weaknesses: profile.weaknesses.clone(),
            interests: profile.interests.clone(),
            course: profile.course.clone(),
            year: profile.year.clone(),
        })
    }

    /// Fetch a learner by id
    pub async fn learner(&self, id: i64) -> Result<Option<Learner>> {
        let conn = self.conn.lock().await;
        let learner = conn
            .query_row(
                "SELECT id, name, strengths, weaknesses, interests, course, year FROM learners WHERE id = ?1",
                [id],
                learner_from_row,
            )
            .optional()?;
        Ok(learner)
    }

    /// List all learners ordered by id
    pub async fn list_learners(&self) -> Result<Vec<Learner>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, strengths, weaknesses, interests, course, year FROM learners ORDER BY id ASC",
        )?;
        let learners = stmt
            .query_map([], learner_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(learners)
    }

    /// Current roadmap topic for a learner, if any
    pub async fn current_topic(&self, learner_id: i64) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let topic = conn
            .query_row(
                "SELECT current_topic FROM learning_status WHERE learner_id = ?1",
                [learner_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(topic.flatten())
    }

    /// Upsert the learner's current roadmap topic
    pub async fn set_current_topic(&self, learner_id: i64, topic: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO learning_status (learner_id, current_topic, updated_at)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(learner_id)
               DO UPDATE SET current_topic = excluded.current_topic, updated_at = excluded.updated_at"#,
            params![learner_id, topic, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ============ Nodes ============

    /// Fetch a node by id
    pub async fn node(&self, id: i64) -> Result<Option<RoadmapNode>> {
        let conn = self.conn.lock().await;
        let node = conn
            .query_row(
                "SELECT id, learner_id, topic, subtopic, position, status, parent_id, resources
                 FROM nodes WHERE id = ?1",
                [id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Full roadmap for a learner, ordered by position
    pub async fn roadmap(&self, learner_id: i64) -> Result<Vec<RoadmapNode>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, learner_id, topic, subtopic, position, status, parent_id, resources
             FROM nodes WHERE learner_id = ?1 ORDER BY position ASC",
        )?;
        let nodes = stmt
            .query_map([learner_id], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Append a batch of top-level nodes for a learner, starting at
    /// `max(position) + 1` (1 if the learner has no nodes yet). Atomic.
    pub async fn create_top_level_batch(
        &self,
        learner_id: i64,
        topic: &str,
        specs: &[NodeSpec],
    ) -> Result<Vec<RoadmapNode>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let max_position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) FROM nodes WHERE learner_id = ?1",
            [learner_id],
            |row| row.get(0),
        )?;
        let start = max_position + 1;

        let mut nodes = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let position = start + i as i64;
            let resources_json = serde_json::to_string(&spec.resources)?;
            tx.execute(
                r#"INSERT INTO nodes (learner_id, topic, subtopic, position, status, parent_id, resources)
                   VALUES (?1, ?2, ?3, ?4, 'pending', NULL, ?5)"#,
                params![learner_id, topic, spec.subtopic, position, resources_json],
            )?;
            nodes.push(RoadmapNode {
                id: tx.last_insert_rowid(),
                learner_id,
                topic: topic.to_string(),
                subtopic: spec.subtopic.clone(),
                position,
                status: NodeStatus::Pending,
                parent_id: None,
                resources: spec.resources.clone(),
            });
        }

        tx.commit()?;
        Ok(nodes)
    }

    /// Insert remediation children directly after their parent, shifting
    /// every later node of the learner by the child count, and create one
    /// pending unit per child. Single transaction: a failure partway
    /// leaves positions untouched.
    pub async fn append_children_with_units(
        &self,
        parent_id: i64,
        children: &[ChildTopic],
    ) -> Result<Vec<(RoadmapNode, MiniUnit)>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let parent: (i64, String, i64) = tx
            .query_row(
                "SELECT learner_id, topic, position FROM nodes WHERE id = ?1",
                [parent_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| EngineError::NotFound(format!("node {parent_id}")))?;
        let (learner_id, topic, parent_position) = parent;

        // Make room: everything after the parent moves down by K
        tx.execute(
            "UPDATE nodes SET position = position + ?1 WHERE learner_id = ?2 AND position > ?3",
            params![children.len() as i64, learner_id, parent_position],
        )?;

        let mut created = Vec::with_capacity(children.len());
        for (i, child) in children.iter().enumerate() {
            let position = parent_position + 1 + i as i64;
            tx.execute(
                r#"INSERT INTO nodes (learner_id, topic, subtopic, position, status, parent_id, resources)
                   VALUES (?1, ?2, ?3, ?4, 'pending', ?5, '[]')"#,
                params![learner_id, topic, child.title, position, parent_id],
            )?;
            let node_id = tx.last_insert_rowid();

            tx.execute(
                r#"INSERT INTO units (node_id, title, description, estimated_minutes, status)
                   VALUES (?1, ?2, ?3, ?4, 'pending')"#,
                params![node_id, child.title, child.description, DEFAULT_UNIT_MINUTES],
            )?;
            let unit_id = tx.last_insert_rowid();

            created.push((
                RoadmapNode {
                    id: node_id,
                    learner_id,
                    topic: topic.clone(),
                    subtopic: child.title.clone(),
                    position,
                    status: NodeStatus::Pending,
                    parent_id: Some(parent_id),
                    resources: Vec::new(),
                },
                MiniUnit {
                    id: unit_id,
                    node_id,
                    title: child.title.clone(),
                    description: Some(child.description.clone()),
                    estimated_minutes: DEFAULT_UNIT_MINUTES,
                    status: UnitStatus::Pending,
                    content_ref: None,
                },
            ));
        }

        tx.commit()?;
        Ok(created)
    }

    // ============ Units ============

    /// Fetch a unit by id
    pub async fn unit(&self, id: i64) -> Result<Option<MiniUnit>> {
        let conn = self.conn.lock().await;
        let unit = conn
            .query_row(
                "SELECT id, node_id, title, description, estimated_minutes, status, content_ref
                 FROM units WHERE id = ?1",
                [id],
                unit_from_row,
            )
            .optional()?;
        Ok(unit)
    }

    /// All units for a learner, ordered by unit id
    pub async fn units_for_learner(&self, learner_id: i64) -> Result<Vec<MiniUnit>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.node_id, u.title, u.description, u.estimated_minutes, u.status, u.content_ref
             FROM units u JOIN nodes n ON n.id = u.node_id
             WHERE n.learner_id = ?1 ORDER BY u.id ASC",
        )?;
        let units = stmt
            .query_map([learner_id], unit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(units)
    }

    /// Highest-priority pending remediation-child unit, if any.
    /// Ordered by owning node position, then unit id.
    pub async fn next_pending_child_unit(&self, learner_id: i64) -> Result<Option<MiniUnit>> {
        let conn = self.conn.lock().await;
        let unit = conn
            .query_row(
                "SELECT u.id, u.node_id, u.title, u.description, u.estimated_minutes, u.status, u.content_ref
                 FROM units u JOIN nodes n ON n.id = u.node_id
                 WHERE n.learner_id = ?1
                   AND u.status = 'pending'
                   AND n.status = 'pending'
                   AND n.parent_id IS NOT NULL
                 ORDER BY n.position ASC, u.id ASC
                 LIMIT 1",
                [learner_id],
                unit_from_row,
            )
            .optional()?;
        Ok(unit)
    }

    /// Highest-priority pending top-level unit, if any
    pub async fn next_pending_top_unit(&self, learner_id: i64) -> Result<Option<MiniUnit>> {
        let conn = self.conn.lock().await;
        let unit = conn
            .query_row(
                "SELECT u.id, u.node_id, u.title, u.description, u.estimated_minutes, u.status, u.content_ref
                 FROM units u JOIN nodes n ON n.id = u.node_id
                 WHERE n.learner_id = ?1
                   AND u.status = 'pending'
                   AND n.status = 'pending'
                   AND n.parent_id IS NULL
                 ORDER BY n.position ASC, u.id ASC
                 LIMIT 1",
                [learner_id],
                unit_from_row,
            )
            .optional()?;
        Ok(unit)
    }

    /// Earliest-position pending top-level node that has no unit yet
    pub async fn first_unstarted_top_node(&self, learner_id: i64) -> Result<Option<RoadmapNode>> {
        let conn = self.conn.lock().await;
        let node = conn
            .query_row(
                "SELECT n.id, n.learner_id, n.topic, n.subtopic, n.position, n.status, n.parent_id, n.resources
                 FROM nodes n
                 WHERE n.learner_id = ?1
                   AND n.status = 'pending'
                   AND n.parent_id IS NULL
                   AND NOT EXISTS (SELECT 1 FROM units u WHERE u.node_id = n.id)
                 ORDER BY n.position ASC
                 LIMIT 1",
                [learner_id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Create a pending unit under a node
    pub async fn create_unit(
        &self,
        node_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<MiniUnit> {
        let conn = self.conn.lock().await;
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM nodes WHERE id = ?1", [node_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(EngineError::NotFound(format!("node {node_id}")));
        }
        conn.execute(
            r#"INSERT INTO units (node_id, title, description, estimated_minutes, status)
               VALUES (?1, ?2, ?3, ?4, 'pending')"#,
            params![node_id, title, description, DEFAULT_UNIT_MINUTES],
        )?;
        Ok(MiniUnit {
            id: conn.last_insert_rowid(),
            node_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            estimated_minutes: DEFAULT_UNIT_MINUTES,
            status: UnitStatus::Pending,
            content_ref: None,
        })
    }

    // ============ Content ============

    /// Cached content for a unit, if generated
    pub async fn content_for_unit(&self, unit_id: i64) -> Result<Option<GeneratedContent>> {
        let conn = self.conn.lock().await;
        let content = conn
            .query_row(
                "SELECT id, unit_id, lesson_text, resources, videos, quiz, created_at
                 FROM content WHERE unit_id = ?1",
                [unit_id],
                content_from_row,
            )
            .optional()?;
        Ok(content)
    }

    /// Persist generated content for a unit and set the unit's content ref,
    /// in one transaction. Content is written at most once per unit; a
    /// second insert is a consistency violation, never a silent replace.
    pub async fn insert_content(
        &self,
        unit_id: i64,
        lesson_text: &str,
        resources: &[String],
        videos: &[String],
        quiz: &[QuizItem],
    ) -> Result<GeneratedContent> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let content_ref: Option<Option<i64>> = tx
            .query_row(
                "SELECT content_ref FROM units WHERE id = ?1",
                [unit_id],
                |row| row.get(0),
            )
            .optional()?;
        match content_ref {
            None => return Err(EngineError::NotFound(format!("unit {unit_id}"))),
            Some(Some(_)) => {
                return Err(EngineError::Consistency(format!(
                    "content already generated for unit {unit_id}"
                )))
            }
            Some(None) => {}
        }

        let created_at = Utc::now();
        let resources_json = serde_json::to_string(resources)?;
        let videos_json = serde_json::to_string(videos)?;
        let quiz_json = serde_json::to_string(quiz)?;
        tx.execute(
            r#"INSERT INTO content (unit_id, lesson_text, resources, videos, quiz, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                unit_id,
                lesson_text,
                resources_json,
                videos_json,
                quiz_json,
                created_at.to_rfc3339(),
            ],
        )?;
        let content_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE units SET content_ref = ?1 WHERE id = ?2",
            params![content_id, unit_id],
        )?;

        tx.commit()?;
        Ok(GeneratedContent {
            id: content_id,
            unit_id,
            lesson_text: lesson_text.to_string(),
            resources: resources.to_vec(),
            videos: videos.to_vec(),
            quiz: quiz.to_vec(),
            created_at,
        })
    }

    // ============ Grading transitions ============

    /// Record attempts and apply the PASS transition: unit done, node done,
    /// then bubble completion upward while every sibling group is finished.
    pub async fn apply_pass(
        &self,
        learner_id: i64,
        unit_id: i64,
        node_id: i64,
        results: &[QuestionResult],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        insert_attempts(&tx, learner_id, unit_id, results)?;
        tx.execute("UPDATE units SET status = 'done' WHERE id = ?1", [unit_id])?;
        tx.execute("UPDATE nodes SET status = 'done' WHERE id = ?1", [node_id])?;

        // Bubble-up: walk parents only; done nodes elsewhere are untouched
        let mut current = node_id;
        loop {
            let parent: Option<i64> = tx.query_row(
                "SELECT parent_id FROM nodes WHERE id = ?1",
                [current],
                |row| row.get(0),
            )?;
            let Some(parent_id) = parent else { break };
            let open: i64 = tx.query_row(
                "SELECT COUNT(*) FROM nodes WHERE parent_id = ?1 AND status != 'done'",
                [parent_id],
                |row| row.get(0),
            )?;
            if open > 0 {
                break;
            }
            tx.execute("UPDATE nodes SET status = 'done' WHERE id = ?1", [parent_id])?;
            current = parent_id;
        }

        tx.commit()?;
        Ok(())
    }

    /// Record attempts and apply the FAIL transition: the node is marked
    /// split; the unit keeps its pending status and is never retried
    /// directly; further work runs through the remediation children.
    pub async fn apply_fail(
        &self,
        learner_id: i64,
        unit_id: i64,
        node_id: i64,
        results: &[QuestionResult],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        insert_attempts(&tx, learner_id, unit_id, results)?;
        tx.execute("UPDATE nodes SET status = 'split' WHERE id = ?1", [node_id])?;

        tx.commit()?;
        Ok(())
    }

    /// All attempts recorded for a unit, oldest first
    pub async fn attempts_for_unit(&self, unit_id: i64) -> Result<Vec<QuizAttempt>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, learner_id, unit_id, question, submitted_answer, is_correct, difficulty, created_at
             FROM attempts WHERE unit_id = ?1 ORDER BY id ASC",
        )?;
        let attempts = stmt
            .query_map([unit_id], attempt_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(attempts)
    }

    // ============ Aggregates & lifecycle ============

    /// (done, total) unit counts for a learner
    pub async fn unit_counts(&self, learner_id: i64) -> Result<(u64, u64)> {
        let conn = self.conn.lock().await;
        let (done, total): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN u.status = 'done' THEN 1 ELSE 0 END), 0), COUNT(*)
             FROM units u JOIN nodes n ON n.id = u.node_id
             WHERE n.learner_id = ?1",
            [learner_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((done as u64, total as u64))
    }

    /// Remove the learner's unfinished nodes and everything hanging off
    /// them, keeping completed work. Used when re-planning a roadmap.
    pub async fn clear_unfinished(&self, learner_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM attempts WHERE unit_id IN (
                 SELECT u.id FROM units u JOIN nodes n ON n.id = u.node_id
                 WHERE n.learner_id = ?1 AND n.status != 'done')",
            [learner_id],
        )?;
        tx.execute(
            "DELETE FROM content WHERE unit_id IN (
                 SELECT u.id FROM units u JOIN nodes n ON n.id = u.node_id
                 WHERE n.learner_id = ?1 AND n.status != 'done')",
            [learner_id],
        )?;
        tx.execute(
            "DELETE FROM units WHERE node_id IN (
                 SELECT id FROM nodes WHERE learner_id = ?1 AND status != 'done')",
            [learner_id],
        )?;
        tx.execute(
            "DELETE FROM nodes WHERE learner_id = ?1 AND status != 'done'",
            [learner_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Whole-learner reset: cascading delete of nodes, units, content, and
    /// attempts (plus learning status). The learner profile itself is kept.
    pub async fn reset(&self, learner_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM attempts WHERE learner_id = ?1", [learner_id])?;
        tx.execute(
            "DELETE FROM content WHERE unit_id IN (
                 SELECT u.id FROM units u JOIN nodes n ON n.id = u.node_id
                 WHERE n.learner_id = ?1)",
            [learner_id],
        )?;
        tx.execute(
            "DELETE FROM units WHERE node_id IN (SELECT id FROM nodes WHERE learner_id = ?1)",
            [learner_id],
        )?;
        tx.execute("DELETE FROM nodes WHERE learner_id = ?1", [learner_id])?;
        tx.execute(
            "DELETE FROM learning_status WHERE learner_id = ?1",
            [learner_id],
        )?;

        tx.commit()?;
        Ok(())
    }
}

// ============ Row mapping ============

fn bad_column(name: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unexpected {name} value: {value}").into(),
    )
}

fn learner_from_row(row: &Row<'_>) -> rusqlite::Result<Learner> {
    Ok(Learner {
        id: row.get("id")?,
        name: row.get("name")?,
        strengths: row.get("strengths")?,
        weaknesses: row.get("weaknesses")?,
        interests: row.get("interests")?,
        course: row.get("course")?,
        year: row.get("year")?,
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<RoadmapNode> {
    let status_raw: String = row.get("status")?;
    let status =
        NodeStatus::parse(&status_raw).ok_or_else(|| bad_column("node status", &status_raw))?;
    let resources_raw: String = row.get("resources")?;
    Ok(RoadmapNode {
        id: row.get("id")?,
        learner_id: row.get("learner_id")?,
        topic: row.get("topic")?,
        subtopic: row.get("subtopic")?,
        position: row.get("position")?,
        status,
        parent_id: row.get("parent_id")?,
        resources: serde_json::from_str(&resources_raw).unwrap_or_default(),
    })
}

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<MiniUnit> {
    let status_raw: String = row.get("status")?;
    let status =
        UnitStatus::parse(&status_raw).ok_or_else(|| bad_column("unit status", &status_raw))?;
    Ok(MiniUnit {
        id: row.get("id")?,
        node_id: row.get("node_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        estimated_minutes: row.get("estimated_minutes")?,
        status,
        content_ref: row.get("content_ref")?,
    })
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<GeneratedContent> {
    let resources_raw: String = row.get("resources")?;
    let videos_raw: String = row.get("videos")?;
    let quiz_raw: String = row.get("quiz")?;
    let quiz: Vec<QuizItem> =
        serde_json::from_str(&quiz_raw).map_err(|_| bad_column("quiz", &quiz_raw))?;
    let created_raw: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|_| bad_column("created_at", &created_raw))?
        .with_timezone(&Utc);
    Ok(GeneratedContent {
        id: row.get("id")?,
        unit_id: row.get("unit_id")?,
        lesson_text: row.get("lesson_text")?,
        resources: serde_json::from_str(&resources_raw).unwrap_or_default(),
        videos: serde_json::from_str(&videos_raw).unwrap_or_default(),
        quiz,
        created_at,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<QuizAttempt> {
    let created_raw: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|_| bad_column("created_at", &created_raw))?
        .with_timezone(&Utc);
    Ok(QuizAttempt {
        id: row.get("id")?,
        learner_id: row.get("learner_id")?,
        unit_id: row.get("unit_id")?,
        question: row.get("question")?,
        submitted_answer: row.get("submitted_answer")?,
        is_correct: row.get::<_, i64>("is_correct")? != 0,
        difficulty: row.get("difficulty")?,
        created_at,
    })
}

fn insert_attempts(
    tx: &Transaction<'_>,
    learner_id: i64,
    unit_id: i64,
    results: &[QuestionResult],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for result in results {
        tx.execute(
            r#"INSERT INTO attempts (learner_id, unit_id, question, submitted_answer, is_correct, difficulty, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                learner_id,
                unit_id,
                result.question,
                result.submitted,
                result.is_correct as i64,
                result.difficulty,
                now,
            ],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_learner() -> (RoadmapStore, i64) {
        let store = RoadmapStore::open_in_memory().unwrap();
        let learner = store
            .add_learner(&LearnerProfile {
                name: "Test Learner".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, learner.id)
    }

    fn specs(names: &[&str]) -> Vec<NodeSpec> {
        names
            .iter()
            .map(|n| NodeSpec {
                subtopic: n.to_string(),
                resources: Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("curriculum.db");
        let store = RoadmapStore::open(&path).await.unwrap();
        let learner = store
            .add_learner(&LearnerProfile {
                name: "P".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(path.exists());
        assert!(store.learner(learner.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_positions_start_at_one() {
        let (store, learner_id) = store_with_learner().await;
        let nodes = store
            .create_top_level_batch(learner_id, "Algebra", &specs(&["a", "b", "c"]))
            .await
            .unwrap();
        let positions: Vec<i64> = nodes.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);

        // A second batch continues after the existing maximum
        let more = store
            .create_top_level_batch(learner_id, "Algebra II", &specs(&["d"]))
            .await
            .unwrap();
        assert_eq!(more[0].position, 4);
    }

    #[tokio::test]
    async fn test_append_children_shifts_later_nodes() {
        let (store, learner_id) = store_with_learner().await;
        let nodes = store
            .create_top_level_batch(learner_id, "T", &specs(&["a", "b", "c"]))
            .await
            .unwrap();

        let children = vec![
            ChildTopic {
                title: "b - Part A".to_string(),
                description: "first half".to_string(),
            },
            ChildTopic {
                title: "b - Part B".to_string(),
                description: "second half".to_string(),
            },
        ];
        let created = store
            .append_children_with_units(nodes[1].id, &children)
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].0.position, 3);
        assert_eq!(created[1].0.position, 4);
        assert_eq!(created[0].0.parent_id, Some(nodes[1].id));

        let roadmap = store.roadmap(learner_id).await.unwrap();
        let positions: Vec<i64> = roadmap.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
        // node "c" moved from 3 to 5
        let c = roadmap.iter().find(|n| n.subtopic == "c").unwrap();
        assert_eq!(c.position, 5);
    }

    #[tokio::test]
    async fn test_append_children_unknown_parent() {
        let (store, _) = store_with_learner().await;
        let err = store
            .append_children_with_units(
                999,
                &[ChildTopic {
                    title: "x".to_string(),
                    description: String::new(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_content_written_at_most_once() {
        let (store, learner_id) = store_with_learner().await;
        let nodes = store
            .create_top_level_batch(learner_id, "T", &specs(&["a"]))
            .await
            .unwrap();
        let unit = store.create_unit(nodes[0].id, "a - Part 1", None).await.unwrap();

        let content = store
            .insert_content(unit.id, "lesson", &[], &[], &[])
            .await
            .unwrap();
        assert_eq!(content.unit_id, unit.id);

        let unit = store.unit(unit.id).await.unwrap().unwrap();
        assert_eq!(unit.content_ref, Some(content.id));

        let err = store
            .insert_content(unit.id, "other lesson", &[], &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));

        // The original row is untouched
        let cached = store.content_for_unit(unit.id).await.unwrap().unwrap();
        assert_eq!(cached.lesson_text, "lesson");
    }

    #[tokio::test]
    async fn test_selection_prefers_remediation_children() {
        let (store, learner_id) = store_with_learner().await;
        let nodes = store
            .create_top_level_batch(learner_id, "T", &specs(&["a", "b"]))
            .await
            .unwrap();
        let top_unit = store.create_unit(nodes[1].id, "b - Part 1", None).await.unwrap();

        assert!(store
            .next_pending_child_unit(learner_id)
            .await
            .unwrap()
            .is_none());
        let picked = store.next_pending_top_unit(learner_id).await.unwrap().unwrap();
        assert_eq!(picked.id, top_unit.id);

        let children = vec![
            ChildTopic {
                title: "a - Part A".to_string(),
                description: String::new(),
            },
            ChildTopic {
                title: "a - Part B".to_string(),
                description: String::new(),
            },
        ];
        let created = store
            .append_children_with_units(nodes[0].id, &children)
            .await
            .unwrap();

        let picked = store
            .next_pending_child_unit(learner_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, created[0].1.id);
    }

    #[tokio::test]
    async fn test_reset_cascades() {
        let (store, learner_id) = store_with_learner().await;
        let nodes = store
            .create_top_level_batch(learner_id, "T", &specs(&["a"]))
            .await
            .unwrap();
        let unit = store.create_unit(nodes[0].id, "a - Part 1", None).await.unwrap();
        store
            .insert_content(unit.id, "lesson", &[], &[], &[])
            .await
            .unwrap();
        store.set_current_topic(learner_id, "T").await.unwrap();
        store
            .apply_pass(
                learner_id,
                unit.id,
                nodes[0].id,
                &[QuestionResult {
                    question: "q".to_string(),
                    submitted: Some("a".to_string()),
                    correct_answer: "a".to_string(),
                    difficulty: "Easy".to_string(),
                    is_correct: true,
                }],
            )
            .await
            .unwrap();

        store.reset(learner_id).await.unwrap();

        assert!(store.roadmap(learner_id).await.unwrap().is_empty());
        assert!(store.units_for_learner(learner_id).await.unwrap().is_empty());
        assert!(store.content_for_unit(unit.id).await.unwrap().is_none());
        assert!(store.attempts_for_unit(unit.id).await.unwrap().is_empty());
        assert!(store.current_topic(learner_id).await.unwrap().is_none());
        // Profile survives a reset
        assert!(store.learner(learner_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bubble_up_marks_parent_done() {
        let (store, learner_id) = store_with_learner().await;
        let nodes = store
            .create_top_level_batch(learner_id, "T", &specs(&["a"]))
            .await
            .unwrap();
        let unit = store.create_unit(nodes[0].id, "a - Part 1", None).await.unwrap();
        store.apply_fail(learner_id, unit.id, nodes[0].id, &[]).await.unwrap();

        let children = vec![
            ChildTopic {
                title: "a - Part A".to_string(),
                description: String::new(),
            },
            ChildTopic {
                title: "a - Part B".to_string(),
                description: String::new(),
            },
        ];
        let created = store
            .append_children_with_units(nodes[0].id, &children)
            .await
            .unwrap();

        store
            .apply_pass(learner_id, created[0].1.id, created[0].0.id, &[])
            .await
            .unwrap();
        let parent = store.node(nodes[0].id).await.unwrap().unwrap();
        assert_eq!(parent.status, NodeStatus::Split);

        store
            .apply_pass(learner_id, created[1].1.id, created[1].0.id, &[])
            .await
            .unwrap();
        let parent = store.node(nodes[0].id).await.unwrap().unwrap();
        assert_eq!(parent.status, NodeStatus::Done);
    }

    #[tokio::test]
    async fn test_unit_counts() {
        let (store, learner_id) = store_with_learner().await;
        assert_eq!(store.unit_counts(learner_id).await.unwrap(), (0, 0));

        let nodes = store
            .create_top_level_batch(learner_id, "T", &specs(&["a", "b"]))
            .await
            .unwrap();
        let u1 = store.create_unit(nodes[0].id, "a - Part 1", None).await.unwrap();
        store.create_unit(nodes[1].id, "b - Part 1", None).await.unwrap();
        store.apply_pass(learner_id, u1.id, nodes[0].id, &[]).await.unwrap();

        assert_eq!(store.unit_counts(learner_id).await.unwrap(), (1, 2));
    }
}
