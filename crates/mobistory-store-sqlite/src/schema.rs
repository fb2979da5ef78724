//! SQL schema for the Mobistory SQLite store.
//!
//! Executed once at connection startup; idempotent thanks to
//! `CREATE TABLE IF NOT EXISTS`. Catalog seed rows and the initial
//! partition range are inserted separately because they need
//! runtime-generated ids (see `store::SqliteStore::seed`).

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Entities & identity history ─────────────────────────────────────────

CREATE TABLE IF NOT EXISTS entities (
    entity_id           TEXT PRIMARY KEY,
    entity_code         TEXT NOT NULL UNIQUE,
    kind                TEXT NOT NULL,    -- 'person' | 'company' | 'device'
    legal_id            TEXT UNIQUE,      -- CPF / CNPJ
    active              INTEGER NOT NULL DEFAULT 1,
    verified            INTEGER NOT NULL DEFAULT 0,
    is_anonymous        INTEGER NOT NULL DEFAULT 0,
    device_fingerprint  TEXT,
    primary_name_id     TEXT,
    primary_email_id    TEXT,
    primary_phone_id    TEXT,
    created_at          TEXT NOT NULL
);

-- Append-only. Rows are closed (is_current = 0, end_date set), never
-- deleted.
CREATE TABLE IF NOT EXISTS entity_names (
    name_id     TEXT PRIMARY KEY,
    entity_id   TEXT NOT NULL REFERENCES entities(entity_id),
    name_type   TEXT NOT NULL,            -- 'display_name', 'legal_name', ...
    value       TEXT NOT NULL,
    is_current  INTEGER NOT NULL DEFAULT 1,
    start_date  TEXT NOT NULL,
    end_date    TEXT,
    reason      TEXT,
    changed_by  TEXT REFERENCES entities(entity_id)
);

CREATE TABLE IF NOT EXISTS entity_contacts (
    contact_id   TEXT PRIMARY KEY,
    entity_id    TEXT NOT NULL REFERENCES entities(entity_id),
    contact_type TEXT NOT NULL,           -- 'email', 'phone', ...
    value        TEXT NOT NULL,
    is_current   INTEGER NOT NULL DEFAULT 1,
    is_verified  INTEGER NOT NULL DEFAULT 0,
    verified_at  TEXT,
    label        TEXT,
    start_date   TEXT NOT NULL,
    end_date     TEXT
);

-- ── Vehicles ────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS vehicles (
    vehicle_id         TEXT PRIMARY KEY,
    vin                TEXT UNIQUE,
    renavam            TEXT UNIQUE,
    brand_id           TEXT,
    model_id           TEXT,
    version_id         TEXT,
    manufacturing_year INTEGER,
    model_year         INTEGER,
    created_at         TEXT NOT NULL
);

-- ── Link role & permission catalogs ─────────────────────────────────────

CREATE TABLE IF NOT EXISTS link_types (
    link_type_id TEXT PRIMARY KEY,
    code         TEXT NOT NULL UNIQUE,
    name         TEXT NOT NULL,
    description  TEXT,
    active       INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS permissions (
    permission_id TEXT PRIMARY KEY,
    code          TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    description   TEXT,
    category      TEXT NOT NULL,  -- 'operation' | 'management' | 'administration'
    active        INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS link_type_permissions (
    link_type_id  TEXT NOT NULL REFERENCES link_types(link_type_id),
    permission_id TEXT NOT NULL REFERENCES permissions(permission_id),
    created_at    TEXT NOT NULL,
    PRIMARY KEY (link_type_id, permission_id)
);

-- ── Links & status history ──────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS links (
    link_id        TEXT PRIMARY KEY,
    link_code      TEXT NOT NULL UNIQUE,
    entity_id      TEXT NOT NULL REFERENCES entities(entity_id),
    vehicle_id     TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    link_type_id   TEXT NOT NULL REFERENCES link_types(link_type_id),
    status         TEXT NOT NULL,
    start_date     TEXT NOT NULL,
    end_date       TEXT,
    document_proof TEXT,
    validated_at   TEXT,
    validated_by   TEXT REFERENCES entities(entity_id),
    observations   TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- Append-only audit trail; one row per creation or transition.
CREATE TABLE IF NOT EXISTS link_status_changes (
    change_id   TEXT PRIMARY KEY,
    link_id     TEXT NOT NULL REFERENCES links(link_id),
    from_status TEXT,
    to_status   TEXT NOT NULL,
    changed_by  TEXT REFERENCES entities(entity_id),
    reason      TEXT,
    recorded_at TEXT NOT NULL
);

-- ── Event log ───────────────────────────────────────────────────────────

-- Append-only. The UNIQUE source pair is the idempotency key: replays are
-- INSERT OR IGNOREd away.
CREATE TABLE IF NOT EXISTS vehicle_events (
    event_id         TEXT PRIMARY KEY,
    vehicle_id       TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    entity_id        TEXT REFERENCES entities(entity_id),
    event_category   TEXT NOT NULL,
    event_type       TEXT NOT NULL,
    event_timestamp  TEXT NOT NULL,
    severity         TEXT,
    title            TEXT NOT NULL,
    description      TEXT,
    event_data       TEXT NOT NULL DEFAULT '{}',
    source_table     TEXT NOT NULL,
    source_record_id TEXT NOT NULL,
    tags             TEXT NOT NULL DEFAULT '[]',
    visibility       TEXT NOT NULL DEFAULT 'owner_only',
    recorded_at      TEXT NOT NULL,
    UNIQUE (source_table, source_record_id)
);

-- Quarterly ranges the log accepts inserts for. Rows are created and
-- dropped by explicit administrative calls only.
CREATE TABLE IF NOT EXISTS event_partitions (
    name     TEXT PRIMARY KEY,    -- vehicle_events_<year>_q<quarter>
    year     INTEGER NOT NULL,
    quarter  INTEGER NOT NULL,
    start_ts TEXT NOT NULL,       -- inclusive
    end_ts   TEXT NOT NULL,       -- exclusive
    UNIQUE (year, quarter)
);

-- ── Source-of-truth records ─────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS refuels (
    refuel_id     TEXT PRIMARY KEY,
    vehicle_id    TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    registered_by TEXT REFERENCES entities(entity_id),
    quantity      REAL NOT NULL,
    unit_price    REAL,
    total_price   REAL,
    refuel_km     INTEGER,
    full_tank     INTEGER NOT NULL DEFAULT 0,
    observations  TEXT,
    refuel_date   TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mileage_records (
    record_id   TEXT PRIMARY KEY,
    vehicle_id  TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    odometer_id TEXT,
    mileage     INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS claims (
    claim_id          TEXT PRIMARY KEY,
    vehicle_id        TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    link_id           TEXT REFERENCES links(link_id),
    claim_type        TEXT,
    severity          TEXT,           -- 'minor' .. 'total_loss'
    claim_date        TEXT NOT NULL,
    claim_km          INTEGER,
    location_lat      REAL,
    location_lng      REAL,
    address           TEXT,
    police_report     TEXT,
    insurance_status  TEXT,
    total_repair_cost REAL,
    status            TEXT NOT NULL DEFAULT 'pending',
    description       TEXT,
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plates (
    plate_id             TEXT PRIMARY KEY,
    vehicle_id           TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    plate_number         TEXT NOT NULL,
    state                TEXT,
    city                 TEXT,
    licensing_start_date TEXT,
    licensing_end_date   TEXT,
    status               TEXT NOT NULL,   -- 'active' | 'inactive'
    created_by           TEXT REFERENCES entities(entity_id),
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS odometers (
    odometer_id       TEXT PRIMARY KEY,
    vehicle_id        TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    brand             TEXT,
    model             TEXT,
    part_number       TEXT,
    installation_date TEXT,
    removal_date      TEXT,
    cost              REAL,
    warranty_months   INTEGER,
    reason_for_change TEXT,
    damage_type       TEXT,
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vehicle_colors (
    color_id    TEXT PRIMARY KEY,
    vehicle_id  TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    color_name  TEXT NOT NULL,
    is_primary  INTEGER NOT NULL DEFAULT 0,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vehicle_covers (
    cover_id      TEXT PRIMARY KEY,
    vehicle_id    TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    file_id       TEXT NOT NULL,
    file_url      TEXT,
    is_primary    INTEGER NOT NULL DEFAULT 0,
    display_order INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS actions (
    action_id     TEXT PRIMARY KEY,
    vehicle_id    TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    action_type   TEXT,
    title         TEXT NOT NULL,
    description   TEXT,
    status        TEXT NOT NULL,
    priority      TEXT,
    scheduled_for TEXT,
    executed_at   TEXT,
    executed_by   TEXT REFERENCES entities(entity_id),
    created_at    TEXT NOT NULL
);

-- ── Indexes ─────────────────────────────────────────────────────────────

CREATE INDEX IF NOT EXISTS names_entity_idx     ON entity_names(entity_id, name_type);
CREATE INDEX IF NOT EXISTS contacts_entity_idx  ON entity_contacts(entity_id, contact_type);
CREATE INDEX IF NOT EXISTS links_vehicle_idx    ON links(vehicle_id, status);
CREATE INDEX IF NOT EXISTS links_entity_idx     ON links(entity_id, status);
CREATE INDEX IF NOT EXISTS changes_link_idx     ON link_status_changes(link_id, recorded_at);
CREATE INDEX IF NOT EXISTS events_vehicle_idx   ON vehicle_events(vehicle_id, event_timestamp DESC);
CREATE INDEX IF NOT EXISTS events_category_idx  ON vehicle_events(event_category, event_timestamp DESC);
CREATE INDEX IF NOT EXISTS events_entity_idx    ON vehicle_events(entity_id, event_timestamp DESC);
CREATE INDEX IF NOT EXISTS mileage_vehicle_idx  ON mileage_records(vehicle_id, recorded_at DESC);
CREATE INDEX IF NOT EXISTS plates_vehicle_idx   ON plates(vehicle_id, status);
CREATE INDEX IF NOT EXISTS colors_vehicle_idx   ON vehicle_colors(vehicle_id, is_primary);

PRAGMA user_version = 1;
";
