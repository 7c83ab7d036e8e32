use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Once;

use chrono::NaiveDate;
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use serde_json::{Value, json};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::auth::AccountStatus;
use crate::db::{
    AccountProfile, NewAccount, NewMember, NewPackage, NewSession, NewTrainer, create_account,
    create_package, create_session, register_member,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::init_rocket;
use crate::models::Level;

static INIT: Once = Once::new();

pub const STANDARD_PASSWORD: &str = "password123";
pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";
pub const TERM_DAYS: i64 = 30;

pub struct TestAccount {
    pub email: String,
    pub status: AccountStatus,
    pub profile: TestProfile,
}

pub enum TestProfile {
    Admin,
    Member {
        name: String,
        package: Option<String>,
        is_active: Option<bool>,
    },
    Trainer {
        name: String,
        specialty: String,
    },
}

pub struct TestPackage {
    pub name: String,
    pub price: f64,
    pub is_active: bool,
}

pub struct TestSession {
    pub key: String,
    pub trainer_email: String,
    pub date: NaiveDate,
    pub time: String,
    pub session_type: String,
    pub max_participants: i64,
}

/// Seeds an in-memory database. Packages are created first, then accounts,
/// sessions and registrations, so later entries may refer to earlier ones by
/// email, package name or session key.
#[derive(Default)]
pub struct TestDbBuilder {
    accounts: Vec<TestAccount>,
    packages: Vec<TestPackage>,
    sessions: Vec<TestSession>,
    registrations: Vec<(String, String)>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admin(mut self, email: &str) -> Self {
        self.accounts.push(TestAccount {
            email: email.to_string(),
            status: AccountStatus::Approved,
            profile: TestProfile::Admin,
        });
        self
    }

    /// Approved member without a package, hence inactive.
    pub fn member(self, email: &str, name: &str) -> Self {
        self.member_with(email, name, AccountStatus::Approved, None, None)
    }

    /// Approved member marked active without holding a package.
    pub fn active_member(self, email: &str, name: &str) -> Self {
        self.member_with(email, name, AccountStatus::Approved, None, Some(true))
    }

    pub fn member_with_package(self, email: &str, name: &str, package: &str) -> Self {
        self.member_with(email, name, AccountStatus::Approved, Some(package), None)
    }

    pub fn pending_member(self, email: &str, name: &str) -> Self {
        self.member_with(email, name, AccountStatus::Pending, None, None)
    }

    pub fn member_with(
        mut self,
        email: &str,
        name: &str,
        status: AccountStatus,
        package: Option<&str>,
        is_active: Option<bool>,
    ) -> Self {
        self.accounts.push(TestAccount {
            email: email.to_string(),
            status,
            profile: TestProfile::Member {
                name: name.to_string(),
                package: package.map(String::from),
                is_active,
            },
        });
        self
    }

    pub fn trainer(mut self, email: &str, name: &str) -> Self {
        self.accounts.push(TestAccount {
            email: email.to_string(),
            status: AccountStatus::Approved,
            profile: TestProfile::Trainer {
                name: name.to_string(),
                specialty: "Strength".to_string(),
            },
        });
        self
    }

    pub fn package(mut self, name: &str, price: f64) -> Self {
        self.packages.push(TestPackage {
            name: name.to_string(),
            price,
            is_active: true,
        });
        self
    }

    pub fn withdrawn_package(mut self, name: &str, price: f64) -> Self {
        self.packages.push(TestPackage {
            name: name.to_string(),
            price,
            is_active: false,
        });
        self
    }

    pub fn session(
        mut self,
        key: &str,
        trainer_email: &str,
        date: &str,
        time: &str,
        max_participants: i64,
    ) -> Self {
        self.sessions.push(TestSession {
            key: key.to_string(),
            trainer_email: trainer_email.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("test date"),
            time: time.to_string(),
            session_type: "Yoga".to_string(),
            max_participants,
        });
        self
    }

    pub fn registration(mut self, session_key: &str, member_email: &str) -> Self {
        self.registrations
            .push((session_key.to_string(), member_email.to_string()));
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });

        // One connection that never expires keeps the in-memory database alive.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut db = TestDb {
            pool,
            user_ids: HashMap::new(),
            member_ids: HashMap::new(),
            trainer_ids: HashMap::new(),
            package_ids: HashMap::new(),
            session_ids: HashMap::new(),
        };

        for package in self.packages {
            let created = create_package(
                &db.pool,
                NewPackage {
                    name: package.name.clone(),
                    description: None,
                    price: package.price,
                    sessions_per_month: 0,
                    is_active: package.is_active,
                },
            )
            .await?;
            db.package_ids.insert(package.name, created.id);
        }

        for account in self.accounts {
            let profile = match &account.profile {
                TestProfile::Admin => AccountProfile::None,
                TestProfile::Member {
                    name,
                    package,
                    is_active,
                } => AccountProfile::Member(NewMember {
                    name: name.clone(),
                    level: Level::Beginner,
                    package_id: package.as_deref().map(|p| db.package_id(p)),
                    is_active: *is_active,
                    ..Default::default()
                }),
                TestProfile::Trainer { name, specialty } => AccountProfile::Trainer(NewTrainer {
                    name: name.clone(),
                    specialty: specialty.clone(),
                    ..Default::default()
                }),
            };

            let created = create_account(
                &db.pool,
                NewAccount {
                    email: account.email.clone(),
                    password: STANDARD_PASSWORD.to_string(),
                    status: account.status,
                    profile,
                },
                TERM_DAYS,
            )
            .await?;

            db.user_ids.insert(account.email.clone(), created.user_id);
            if let Some(profile_id) = created.profile_id {
                match account.profile {
                    TestProfile::Member { .. } => db.member_ids.insert(account.email, profile_id),
                    TestProfile::Trainer { .. } => db.trainer_ids.insert(account.email, profile_id),
                    TestProfile::Admin => None,
                };
            }
        }

        for session in self.sessions {
            let created = create_session(
                &db.pool,
                NewSession {
                    date: session.date,
                    time: session.time,
                    session_type: session.session_type,
                    max_participants: session.max_participants,
                    trainer_id: db.trainer_id(&session.trainer_email),
                },
            )
            .await?;
            db.session_ids.insert(session.key, created.id);
        }

        for (session_key, member_email) in self.registrations {
            register_member(
                &db.pool,
                db.session_id(&session_key),
                db.member_id(&member_email),
            )
            .await?;
        }

        Ok(db)
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_ids: HashMap<String, i64>,
    pub member_ids: HashMap<String, i64>,
    pub trainer_ids: HashMap<String, i64>,
    pub package_ids: HashMap<String, i64>,
    pub session_ids: HashMap<String, i64>,
}

impl TestDb {
    pub fn user_id(&self, email: &str) -> i64 {
        self.user_ids[email]
    }

    pub fn member_id(&self, email: &str) -> i64 {
        self.member_ids[email]
    }

    pub fn trainer_id(&self, email: &str) -> i64 {
        self.trainer_ids[email]
    }

    pub fn package_id(&self, name: &str) -> i64 {
        self.package_ids[name]
    }

    pub fn session_id(&self, key: &str) -> i64 {
        self.session_ids[key]
    }

    pub async fn notification_count(&self, member_email: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE member_id = ?")
            .bind(self.member_id(member_email))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// Admin, trainer, active and inactive members, a package and two sessions.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .admin("admin@gym.test")
        .package("Monthly", 49.0)
        .trainer("trainer@gym.test", "Ana Trainer")
        .trainer("other.trainer@gym.test", "Marko Trainer")
        .member_with_package("member@gym.test", "Mia Member", "Monthly")
        .member("inactive@gym.test", "Ivo Inactive")
        .session("yoga", "trainer@gym.test", "2030-06-02", "18:00", 10)
        .session("spin", "other.trainer@gym.test", "2030-06-03", "07:30", 2)
        .build()
        .await
        .expect("Failed to build test database")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        token_ttl_hours: 2,
        membership_term_days: TERM_DAYS,
        expiry_sweep_interval_secs: 86_400,
        admin_seed: None,
    }
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let rocket = init_rocket(test_db.pool.clone(), test_config());
    let client = Client::tracked(rocket)
        .await
        .expect("valid rocket instance");

    (client, test_db)
}

pub fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

pub async fn login_test_user(client: &Client, email: &str) -> String {
    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(
            json!({
                "email": email,
                "password": STANDARD_PASSWORD
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok, "login failed for {}", email);

    let body = json_body(response).await;
    body["accessToken"]
        .as_str()
        .expect("access token in login response")
        .to_string()
}

pub async fn json_body(response: LocalResponse<'_>) -> Value {
    let body = response.into_string().await.expect("response body");
    serde_json::from_str(&body).expect("JSON response body")
}
