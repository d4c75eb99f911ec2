use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct PrincipalStore {
    pool: SqlitePool,
}

/// Role of a principal. Drives which dashboard subtrees it may enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
    Dean,
    Club,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
            Role::Dean => "dean",
            Role::Club => "club",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            "dean" => Ok(Role::Dean),
            "club" => Ok(Role::Club),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Principal {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub student_id: Option<String>,
    pub name: String,
    pub role: Role,
}

/// Fields needed to create a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal<'a> {
    pub uuid: &'a str,
    pub email: &'a str,
    pub student_id: Option<&'a str>,
    pub name: &'a str,
    pub role: Role,
    pub password_hash: &'a str,
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: i64,
    uuid: String,
    email: String,
    student_id: Option<String>,
    name: String,
    role: String,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = sqlx::Error;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        Ok(Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            student_id: row.student_id,
            name: row.name,
            role,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    uuid: String,
    email: String,
    student_id: Option<String>,
    name: String,
    role: String,
    password_hash: String,
}

impl CredentialRow {
    fn split(self) -> (PrincipalRow, String) {
        let principal = PrincipalRow {
            id: self.id,
            uuid: self.uuid,
            email: self.email,
            student_id: self.student_id,
            name: self.name,
            role: self.role,
        };
        (principal, self.password_hash)
    }
}

impl PrincipalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new principal. Returns the row ID.
    pub async fn create(&self, new: &NewPrincipal<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO principals (uuid, email, student_id, name, role, password_hash) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new.uuid)
        .bind(new.email)
        .bind(new.student_id)
        .bind(new.name)
        .bind(new.role.as_str())
        .bind(new.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a principal by its public UUID (the session subject).
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<PrincipalRow> = sqlx::query_as(
            "SELECT id, uuid, email, student_id, name, role FROM principals WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Principal::try_from).transpose()
    }

    /// Look up a principal and its password hash by email or student ID.
    pub async fn get_credentials(
        &self,
        identifier: &str,
    ) -> Result<Option<(Principal, String)>, sqlx::Error> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT id, uuid, email, student_id, name, role, password_hash FROM principals WHERE email = ? OR student_id = ? LIMIT 1",
        )
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let (principal, password_hash) = row.split();
                Ok(Some((Principal::try_from(principal)?, password_hash)))
            }
            None => Ok(None),
        }
    }

    /// Check whether an email or student ID is already registered.
    pub async fn is_taken(
        &self,
        email: &str,
        student_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM principals WHERE email = ? OR (? IS NOT NULL AND student_id = ?)",
        )
        .bind(email)
        .bind(student_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Record a successful login.
    pub async fn touch_last_login(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE principals SET last_login_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set the role for a principal.
    pub async fn set_role(&self, uuid: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE principals SET role = ? WHERE uuid = ?")
            .bind(role.as_str())
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a principal by UUID.
    pub async fn delete(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM principals WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
