//! Full runs from SQLite fixtures into the in-memory graph.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relgraph_core::graph::{EdgeType, VertexType};
use relgraph_core::stats::StatisticsSnapshot;
use relgraph_core::target::{EdgeUpsert, GraphWriter, UpsertOutcome, VertexRef, VertexUpsert};
use relgraph_core::value::Value;
use relgraph_core::{
    ImportStatistics, MemoryGraph, Migration, MigrationConfig, MigrationContext, MigrationError, Stage,
};

use crate::SourcePool;

fn fixture(sql: &str) -> SourcePool {
    let pool = SourcePool::in_memory().unwrap();
    pool.execute_batch(sql).unwrap();
    pool
}

async fn migrate(pool: &SourcePool, config: &MigrationConfig, graph: &MemoryGraph) -> (StatisticsSnapshot, Arc<ImportStatistics>) {
    let stats = Arc::new(ImportStatistics::new());
    let ctx = MigrationContext::new(config, stats.clone());
    let mut migration = Migration::new(config, ctx);
    let snapshot = migration.run(pool, graph).await.unwrap();
    assert_eq!(migration.stage(), Some(Stage::Done));
    (snapshot, stats)
}

fn key(label: &str, column: &str, value: i64) -> VertexRef {
    VertexRef {
        label: label.to_string(),
        key: vec![(column.to_string(), Value::Int(value))],
    }
}

const FILMS_AND_DIRECTORS: &str = "
    CREATE TABLE DIRECTOR (ID INTEGER PRIMARY KEY, NAME TEXT);
    CREATE TABLE FILM (
        ID INTEGER PRIMARY KEY,
        TITLE TEXT,
        DIRECTOR INTEGER REFERENCES DIRECTOR(ID),
        CATEGORY TEXT
    );
    INSERT INTO DIRECTOR VALUES (1, 'Kubrick'), (2, 'Varda');
    INSERT INTO FILM VALUES (10, 'Paths of Glory', 1, 'war'),
                            (11, 'Cleo from 5 to 7', 2, 'drama'),
                            (12, 'Untitled', NULL, NULL);
";

const FILMS_AND_ACTORS: &str = "
    CREATE TABLE FILM (ID INTEGER PRIMARY KEY, TITLE TEXT);
    CREATE TABLE ACTOR (ID INTEGER PRIMARY KEY, NAME TEXT);
    CREATE TABLE FILM_ACTOR (
        FILM_ID INTEGER REFERENCES FILM(ID),
        ACTOR_ID INTEGER REFERENCES ACTOR(ID),
        PRIMARY KEY (FILM_ID, ACTOR_ID)
    );
    INSERT INTO FILM VALUES (1, 'A'), (2, 'B'), (3, 'C'), (4, 'D');
    INSERT INTO ACTOR VALUES (1, 'a'), (2, 'b'), (3, 'c'), (4, 'd'), (5, 'e'), (6, 'f'), (7, 'g');
    INSERT INTO FILM_ACTOR VALUES (1, 1), (1, 2), (1, 3), (2, 3), (2, 4), (3, 5),
                                  (3, 6), (4, 7), (4, 1), (2, 6);
";

#[tokio::test]
async fn test_foreign_key_becomes_edge() {
    let pool = fixture(FILMS_AND_DIRECTORS);
    let config = MigrationConfig::from_toml("[mapping]\nnaming = \"java\"\n").unwrap();
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &config, &graph).await;

    assert_eq!(graph.vertex_types().into_iter().collect::<Vec<_>>(), vec!["Director", "Film"]);
    assert_eq!(graph.edge_types().into_iter().collect::<Vec<_>>(), vec!["HasDirector"]);
    assert_eq!(graph.vertex_count(), 5);
    // the film without a director has no edge
    assert_eq!(graph.count_edge_type("HasDirector"), 2);

    let film = graph.vertex(&key("Film", "id", 10)).unwrap();
    assert_eq!(film.properties.get("title"), Some(&Value::from("Paths of Glory")));
    assert_eq!(snapshot.vertices_created, 5);
    assert_eq!(snapshot.records_analyzed, snapshot.records_total);
    assert_eq!(snapshot.rows_skipped, 0);
}

#[tokio::test]
async fn test_junction_table_becomes_edges() {
    let pool = fixture(FILMS_AND_ACTORS);
    let config = MigrationConfig::from_toml("[import]\nbatch_size = 3\n").unwrap();
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &config, &graph).await;

    assert_eq!(graph.vertex_count(), 11);
    assert_eq!(graph.edge_count(), 10);
    assert_eq!(graph.count_edge_type("FILM2ACTOR"), 10);
    assert_eq!(graph.count_label("FILM_ACTOR"), 0);
    assert_eq!(snapshot.aggregated_edge_types, 1);
    assert_eq!(snapshot.records_total, 21);
    assert_eq!(snapshot.percentage(), 100.0);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let pool = fixture(FILMS_AND_ACTORS);
    let config = MigrationConfig::default();
    let graph = MemoryGraph::new();

    migrate(&pool, &config, &graph).await;
    let (second, _) = migrate(&pool, &config, &graph).await;

    assert_eq!(graph.vertex_count(), 11);
    assert_eq!(graph.edge_count(), 10);
    assert_eq!(second.vertices_created, 0);
    assert_eq!(second.vertices_updated, 11);
    assert_eq!(second.edges_created, 0);
    assert_eq!(second.edges_updated, 10);
}

#[tokio::test]
async fn test_naive_strategy_keeps_junction_vertices() {
    let pool = fixture(FILMS_AND_ACTORS);
    let config = MigrationConfig::from_toml("[mapping]\nstrategy = \"naive\"\n").unwrap();
    let graph = MemoryGraph::new();

    migrate(&pool, &config, &graph).await;

    assert_eq!(graph.count_label("FILM_ACTOR"), 10);
    assert_eq!(graph.vertex_count(), 21);
    assert_eq!(graph.edge_count(), 20);
}

#[tokio::test]
async fn test_table_per_type_rows_share_one_vertex() {
    let pool = fixture(
        "CREATE TABLE PERSON (ID INTEGER PRIMARY KEY, NAME TEXT);
         CREATE TABLE EMPLOYEE (ID INTEGER PRIMARY KEY REFERENCES PERSON(ID), SALARY INTEGER);
         INSERT INTO PERSON VALUES (1, 'Ann'), (2, 'Bob'), (3, 'Cy');
         INSERT INTO EMPLOYEE VALUES (2, 5000);",
    );
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &MigrationConfig::default(), &graph).await;

    assert_eq!(snapshot.hierarchies, 1);
    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(graph.count_label("PERSON"), 3);
    assert_eq!(graph.count_label("EMPLOYEE"), 1);
    // inheritance is expressed by labels, not edges
    assert_eq!(graph.edge_count(), 0);

    let bob = graph.vertex(&key("PERSON", "ID", 2)).unwrap();
    assert_eq!(bob.properties.get("NAME"), Some(&Value::from("Bob")));
    assert_eq!(bob.properties.get("SALARY"), Some(&Value::Int(5000)));
}

#[tokio::test]
async fn test_root_row_joined_from_two_children_yields_one_vertex() {
    let pool = fixture(
        "CREATE TABLE PERSON (ID INTEGER PRIMARY KEY, NAME TEXT);
         CREATE TABLE EMPLOYEE (ID INTEGER PRIMARY KEY REFERENCES PERSON(ID), SALARY INTEGER);
         CREATE TABLE CUSTOMER (ID INTEGER PRIMARY KEY REFERENCES PERSON(ID), SEGMENT TEXT);
         INSERT INTO PERSON VALUES (1, 'Ann'), (2, 'Bob');
         INSERT INTO EMPLOYEE VALUES (1, 4000), (2, 5000);
         INSERT INTO CUSTOMER VALUES (2, 'retail');",
    );
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &MigrationConfig::default(), &graph).await;

    assert_eq!(graph.vertex_count(), 2);
    assert_eq!(snapshot.vertices_created, 2);
    assert_eq!(snapshot.vertices_updated, 0);
    // CUSTOMER scans first by name, so Bob is materialized as a customer
    let bob = graph.vertex(&key("PERSON", "ID", 2)).unwrap();
    assert!(bob.labels.contains("CUSTOMER"));
    assert_eq!(bob.properties.get("SEGMENT"), Some(&Value::from("retail")));
}

#[tokio::test]
async fn test_single_table_hierarchy_resolves_concrete_types() {
    let pool = fixture(
        "CREATE TABLE PERSON (ID INTEGER PRIMARY KEY, KIND TEXT, NAME TEXT, SALARY INTEGER, REGION TEXT);
         INSERT INTO PERSON VALUES (1, 'P', 'Ann', NULL, NULL),
                                   (2, 'E', 'Bob', 100, NULL),
                                   (3, 'M', 'Cy', 200, 'EU');",
    );
    let config = MigrationConfig::from_toml(
        r#"
        [[hierarchy]]
        pattern = "single-table"
        root = "PERSON"
        discriminator = "KIND"
        root_value = "P"

        [[hierarchy.members]]
        name = "EMPLOYEE"
        parent = "PERSON"
        value = "E"
        columns = ["SALARY"]

        [[hierarchy.members]]
        name = "MANAGER"
        parent = "EMPLOYEE"
        value = "M"
        columns = ["REGION"]
        "#,
    )
    .unwrap();
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &config, &graph).await;

    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(snapshot.vertices_created, 3);
    assert_eq!(graph.count_label("EMPLOYEE"), 2);
    assert_eq!(graph.count_label("MANAGER"), 1);

    let manager = graph.vertex(&key("PERSON", "ID", 3)).unwrap();
    assert!(manager.labels.contains("PERSON"));
    assert_eq!(manager.properties.get("REGION"), Some(&Value::from("EU")));
    assert_eq!(manager.properties.get("SALARY"), Some(&Value::Int(200)));

    let ann = graph.vertex(&key("PERSON", "ID", 1)).unwrap();
    assert_eq!(ann.labels.len(), 1);
}

#[tokio::test]
async fn test_table_per_concrete_type_keeps_separate_vertices() {
    let pool = fixture(
        "CREATE TABLE VEHICLE (ID INTEGER PRIMARY KEY, MAKE TEXT);
         CREATE TABLE CAR (ID INTEGER PRIMARY KEY, MAKE TEXT, DOORS INTEGER);
         INSERT INTO VEHICLE VALUES (1, 'Generic');
         INSERT INTO CAR VALUES (1, 'Fiat', 3);",
    );
    let config = MigrationConfig::from_toml(
        r#"
        [[hierarchy]]
        pattern = "table-per-concrete-type"
        root = "VEHICLE"

        [[hierarchy.members]]
        name = "CAR"
        parent = "VEHICLE"
        "#,
    )
    .unwrap();
    let graph = MemoryGraph::new();

    migrate(&pool, &config, &graph).await;

    assert_eq!(graph.vertex_count(), 2);
    let car = graph.vertex(&key("CAR", "ID", 1)).unwrap();
    assert_eq!(car.properties.get("MAKE"), Some(&Value::from("Fiat")));
    assert_eq!(car.properties.get("DOORS"), Some(&Value::Int(3)));
    assert!(car.labels.contains("VEHICLE"));
}

#[tokio::test]
async fn test_unreadable_rows_are_skipped_and_counted() {
    let pool = fixture(
        "CREATE TABLE READING (ID INTEGER PRIMARY KEY, TAKEN DATETIME);
         INSERT INTO READING VALUES (1, '2024-01-01 10:00:00'), (2, 'not a date');",
    );
    let graph = MemoryGraph::new();

    let (snapshot, stats) = migrate(&pool, &MigrationConfig::default(), &graph).await;

    assert_eq!(graph.vertex_count(), 1);
    assert_eq!(snapshot.rows_skipped, 1);
    assert!(stats.warnings().iter().any(|w| w.contains("READING")));
}

#[tokio::test]
async fn test_skipped_row_gets_no_edges() {
    let pool = fixture(
        "CREATE TABLE STUDIO (ID INTEGER PRIMARY KEY, NAME TEXT);
         CREATE TABLE FILM (ID INTEGER PRIMARY KEY, SHOT DATETIME, STUDIO_ID INTEGER REFERENCES STUDIO(ID));
         INSERT INTO STUDIO VALUES (1, 'Ealing');
         INSERT INTO FILM VALUES (10, 'not a date', 1), (11, '1949-06-16 00:00:00', 1);",
    );
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &MigrationConfig::default(), &graph).await;

    assert_eq!(snapshot.rows_skipped, 1);
    assert!(graph.vertex(&key("FILM", "ID", 10)).is_none());
    assert!(graph.vertex(&key("FILM", "ID", 11)).is_some());
    assert_eq!(graph.vertex_count(), 2);
    assert_eq!(graph.edge_count(), 1);
}

#[tokio::test]
async fn test_forward_reference_stub_is_filled_in() {
    // FILM is scanned before STUDIO, so its edges create the studio first
    let pool = fixture(
        "CREATE TABLE STUDIO (ID INTEGER PRIMARY KEY, NAME TEXT);
         CREATE TABLE FILM (ID INTEGER PRIMARY KEY, TITLE TEXT, STUDIO_ID INTEGER REFERENCES STUDIO(ID));
         INSERT INTO STUDIO VALUES (1, 'Ealing');
         INSERT INTO FILM VALUES (10, 'Kind Hearts and Coronets', 1), (11, 'The Ladykillers', 1);",
    );
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &MigrationConfig::default(), &graph).await;

    assert_eq!(graph.count_label("STUDIO"), 1);
    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    let studio = graph.vertex(&key("STUDIO", "ID", 1)).unwrap();
    assert_eq!(studio.properties.get("NAME"), Some(&Value::from("Ealing")));
    // the stub was created by the edge, the scan only filled it in
    assert_eq!(snapshot.vertices_created, 2);
    assert_eq!(snapshot.vertices_updated, 1);
}

#[tokio::test]
async fn test_table_without_primary_key_stops_before_writing() {
    let pool = fixture(
        "CREATE TABLE FILM (ID INTEGER PRIMARY KEY, TITLE TEXT);
         CREATE TABLE LOGLINE (MSG TEXT, NOTE TEXT);
         INSERT INTO FILM VALUES (1, 'A');
         INSERT INTO LOGLINE VALUES ('a', 'x'), ('b', NULL);",
    );
    let config = MigrationConfig::default();
    let graph = MemoryGraph::new();
    let stats = Arc::new(ImportStatistics::new());
    let mut migration = Migration::new(&config, MigrationContext::new(&config, stats));

    let result = migration.run(&pool, &graph).await;

    assert!(matches!(result, Err(MigrationError::Metadata(ref m)) if m.contains("LOGLINE")));
    assert_eq!(migration.stage(), None);
    assert_eq!(graph.vertex_count(), 0);

    let config = MigrationConfig::from_toml("[mapping]\nexclude = [\"logline\"]\n").unwrap();
    migrate(&pool, &config, &graph).await;
    assert_eq!(graph.vertex_count(), 1);
}

#[tokio::test]
async fn test_single_table_hierarchy_with_integer_discriminator() {
    let pool = fixture(
        "CREATE TABLE ACCOUNT (ID INTEGER PRIMARY KEY, TIER INTEGER, OWNER TEXT, CREDIT_LIMIT INTEGER);
         INSERT INTO ACCOUNT VALUES (1, 0, 'Ann', NULL), (2, 1, 'Bob', 500), (3, 1, 'Cy', 900);",
    );
    let config = MigrationConfig::from_toml(
        r#"
        [[hierarchy]]
        pattern = "single-table"
        root = "ACCOUNT"
        discriminator = "TIER"
        root_value = "0"

        [[hierarchy.members]]
        name = "PREMIUM"
        parent = "ACCOUNT"
        value = "1"
        columns = ["CREDIT_LIMIT"]
        "#,
    )
    .unwrap();
    let graph = MemoryGraph::new();

    let (snapshot, _) = migrate(&pool, &config, &graph).await;

    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(snapshot.vertices_updated, 0);
    assert_eq!(graph.count_label("PREMIUM"), 2);
    let bob = graph.vertex(&key("ACCOUNT", "ID", 2)).unwrap();
    assert!(bob.labels.contains("PREMIUM"));
    assert_eq!(bob.properties.get("CREDIT_LIMIT"), Some(&Value::Int(500)));
    assert!(!graph.vertex(&key("ACCOUNT", "ID", 1)).unwrap().labels.contains("PREMIUM"));
}

#[tokio::test]
async fn test_unreadable_junction_key_skips_the_row() {
    let pool = fixture(FILMS_AND_ACTORS);
    pool.execute_batch("INSERT INTO FILM_ACTOR VALUES ('abc', 2);").unwrap();
    let graph = MemoryGraph::new();

    let (snapshot, stats) = migrate(&pool, &MigrationConfig::default(), &graph).await;

    assert_eq!(graph.count_edge_type("FILM2ACTOR"), 10);
    assert_eq!(snapshot.rows_skipped, 1);
    assert!(stats.warnings().iter().any(|w| w.contains("FILM_ACTOR")));
}

/// Accepts a fixed number of vertex writes, then rejects every write.
struct RejectingWriter {
    inner: MemoryGraph,
    remaining: AtomicUsize,
}

#[async_trait]
impl GraphWriter for RejectingWriter {
    async fn create_vertex_type(&self, vertex: &VertexType) -> relgraph_core::MigrationResult<()> {
        self.inner.create_vertex_type(vertex).await
    }

    async fn create_edge_type(&self, edge: &EdgeType) -> relgraph_core::MigrationResult<()> {
        self.inner.create_edge_type(edge).await
    }

    async fn create_index(&self, vertex_type: &str, key_properties: &[String]) -> relgraph_core::MigrationResult<()> {
        self.inner.create_index(vertex_type, key_properties).await
    }

    async fn upsert_vertex(&self, vertex: &VertexUpsert) -> relgraph_core::MigrationResult<UpsertOutcome> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(MigrationError::target_write("constraint violated"));
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        self.inner.upsert_vertex(vertex).await
    }

    async fn upsert_edge(&self, edge: &EdgeUpsert) -> relgraph_core::MigrationResult<UpsertOutcome> {
        self.inner.upsert_edge(edge).await
    }
}

#[tokio::test]
async fn test_target_write_failure_aborts_while_importing() {
    let pool = fixture(FILMS_AND_ACTORS);
    let config = MigrationConfig::default();
    let writer = RejectingWriter {
        inner: MemoryGraph::new(),
        remaining: AtomicUsize::new(2),
    };
    let stats = Arc::new(ImportStatistics::new());
    let mut migration = Migration::new(&config, MigrationContext::new(&config, stats.clone()));

    let result = migration.run(&pool, &writer).await;

    assert!(matches!(result, Err(MigrationError::TargetWrite(_))));
    assert_eq!(migration.stage(), Some(Stage::Importing));
    assert_eq!(writer.inner.vertex_count(), 2);
    assert_eq!(stats.snapshot().vertices_created, 2);
    assert_eq!(writer.inner.edge_count(), 0);
}
