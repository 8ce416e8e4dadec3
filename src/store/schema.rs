pub const SCHEMA: &str = r#"
-- Server-level key/value metadata (CSRF signing key, schema markers)
CREATE TABLE IF NOT EXISTS app_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Accounts hold credentials and a role; profiles carry the person details
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'student',   -- 'student' | 'admin'
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS student_profiles (
    account_id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
    first_name TEXT,
    last_name TEXT,
    phone TEXT,
    address TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are bearer credentials bound to an account
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,      -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,    -- short prefix for fast lookup
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,               -- NULL = never
    last_used_at TEXT
);

CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    instructor_name TEXT NOT NULL,
    price_cents INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Weekly slots; at most one slot per day per course
CREATE TABLE IF NOT EXISTS course_schedules (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    day_of_week TEXT NOT NULL,     -- Monday..Sunday
    start_time TEXT NOT NULL,      -- HH:MM
    end_time TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(course_id, day_of_week)
);

-- Unenroll flips is_active off; the row stays as history
CREATE TABLE IF NOT EXISTS enrollments (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    student_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    enrolled_by TEXT NOT NULL,
    enrolled_at TEXT DEFAULT (datetime('now')),
    is_active INTEGER NOT NULL DEFAULT 1
);

-- General ledger. Dedup identity is (transaction_date, description, amount_cents);
-- deliberately not a uniqueness constraint: two genuinely identical real-world
-- transactions on the same day collide and the second is treated as a duplicate.
CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    transaction_date TEXT NOT NULL,    -- YYYY-MM-DD
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    reference_no TEXT,
    payment_type TEXT,
    student_id TEXT REFERENCES accounts(id) ON DELETE SET NULL,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    is_active INTEGER NOT NULL DEFAULT 1
);

-- Course payment allocations. payment_id links back to the ledger; NULL for
-- manual entries (cash taken at the desk).
CREATE TABLE IF NOT EXISTS allocations (
    id TEXT PRIMARY KEY,
    enrollment_id TEXT NOT NULL REFERENCES enrollments(id) ON DELETE CASCADE,
    payment_id TEXT REFERENCES payments(id) ON DELETE CASCADE,
    amount_cents INTEGER NOT NULL,
    payment_date TEXT NOT NULL,
    method TEXT,
    notes TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- A ledger payment may be allocated at most once. Enforced here rather than by
-- a read-then-write check so concurrent requests get a typed conflict.
CREATE UNIQUE INDEX IF NOT EXISTS idx_allocations_payment
    ON allocations(payment_id) WHERE payment_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS announcements (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- One reaction per (announcement, student); re-reacting overwrites in place
CREATE TABLE IF NOT EXISTS announcement_reactions (
    announcement_id TEXT NOT NULL REFERENCES announcements(id) ON DELETE CASCADE,
    student_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    emoji TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (announcement_id, student_id)
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_account ON tokens(account_id);
CREATE INDEX IF NOT EXISTS idx_schedules_course ON course_schedules(course_id);
CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id);
CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id);
CREATE INDEX IF NOT EXISTS idx_payments_dedup
    ON payments(transaction_date, description, amount_cents);
CREATE INDEX IF NOT EXISTS idx_allocations_enrollment ON allocations(enrollment_id);
CREATE INDEX IF NOT EXISTS idx_announcements_course ON announcements(course_id);
"#;
