//! In-process identity provider
//!
//! Users live in memory with Argon2id password hashes. Access tokens are
//! HS256 JWTs; refresh tokens, challenge tokens, verification tokens and
//! backup codes are random secrets stored only as SHA-256 digests.
//!
//! Revocation state belongs to the provider instance, so two providers never
//! share a revocation list.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tollgate_core::{Identity, IdentityConfig, MfaMethod, UserProfile};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    CodeDelivery, Delivery, DeliveryKind, IdentityError, IdentityProvider, IssuedTokens,
    LogDelivery, MfaVerified, PendingChallenge, SignInOutcome,
};
use crate::auth::jwt::{self, JwtConfig, JwtError};
use crate::auth::password::{
    hash_password_with_config, validate_password_strength, verify_password, PasswordConfig,
};
use crate::auth::{hash_token, random_numeric_code, random_token};

const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;
/// Wrong codes accepted against one challenge before it is burned
const MAX_CHALLENGE_ATTEMPTS: u32 = 5;
const BACKUP_CODE_LEN: usize = 10;

/// Secret material handed to a user enrolling an authenticator app
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    pub secret_base32: String,
    pub otpauth_url: String,
}

#[derive(Debug, Clone)]
enum Factor {
    Totp { secret: Vec<u8> },
    Code { method: MfaMethod, destination: String },
}

impl Factor {
    fn method(&self) -> MfaMethod {
        match self {
            Factor::Totp { .. } => MfaMethod::Totp,
            Factor::Code { method, .. } => *method,
        }
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: String,
    email: String,
    name: Option<String>,
    password_hash: String,
    email_verified: bool,
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    factor: Option<Factor>,
    backup_codes: Vec<String>,
}

impl UserRecord {
    fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            email_verified: self.email_verified,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct ChallengeRecord {
    user_id: String,
    method: MfaMethod,
    expires_at: DateTime<Utc>,
    attempts: u32,
    code_hash: Option<String>,
}

#[derive(Debug)]
struct RefreshGrant {
    user_id: String,
    session_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct VerificationRecord {
    user_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Directory {
    users: HashMap<String, UserRecord>,
    by_email: HashMap<String, String>,
    challenges: HashMap<String, ChallengeRecord>,
    refresh_grants: HashMap<String, RefreshGrant>,
    verification_tokens: HashMap<String, VerificationRecord>,
    /// jti -> token expiry; entries are dropped once the token would be dead anyway
    revoked: HashMap<String, DateTime<Utc>>,
}

impl Directory {
    fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.by_email
            .get(&normalize_email(email))
            .and_then(|id| self.users.get(id))
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.challenges.retain(|_, c| c.expires_at > now);
        self.refresh_grants.retain(|_, g| g.expires_at > now);
        self.verification_tokens.retain(|_, v| v.expires_at > now);
        self.revoked.retain(|_, exp| *exp > now);
    }
}

pub struct LocalIdentityProvider {
    jwt: JwtConfig,
    password: PasswordConfig,
    issuer: String,
    mfa_challenge_ttl: Duration,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    delivery: Arc<dyn CodeDelivery>,
    directory: Mutex<Directory>,
}

impl LocalIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            jwt: JwtConfig::from_identity(config),
            password: PasswordConfig::default(),
            issuer: config.jwt_issuer.clone(),
            mfa_challenge_ttl: config.mfa_challenge_ttl(),
            max_failed_attempts: config.max_failed_attempts.max(1),
            lockout_duration: config.lockout_duration(),
            delivery: Arc::new(LogDelivery),
            directory: Mutex::new(Directory::default()),
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn CodeDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_password_config(mut self, password: PasswordConfig) -> Self {
        self.password = password;
        self
    }

    fn directory(&self) -> Result<MutexGuard<'_, Directory>, IdentityError> {
        self.directory
            .lock()
            .map_err(|_| IdentityError::Unavailable("identity directory poisoned".to_string()))
    }

    /// Insert a user directly, bypassing sign-up and email verification
    pub fn seed_user(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        email_verified: bool,
    ) -> Result<String, IdentityError> {
        let password_hash = hash_password_with_config(password, &self.password)
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        let mut dir = self.directory()?;
        insert_user(&mut dir, email, password_hash, name, email_verified)
    }

    /// Attach an authenticator-app factor, replacing any existing one
    pub fn enroll_totp(&self, user_id: &str) -> Result<TotpEnrollment, IdentityError> {
        let secret = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| IdentityError::Unavailable(format!("TOTP secret generation: {e}")))?;

        let mut dir = self.directory()?;
        let user = dir
            .users
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::Invalid(format!("Unknown user {user_id}")))?;

        let totp = build_totp(&secret, &self.issuer, &user.email)?;
        user.factor = Some(Factor::Totp { secret });

        Ok(TotpEnrollment {
            secret_base32: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
        })
    }

    /// Attach an SMS or email factor delivering codes to `destination`
    pub fn enroll_code_factor(
        &self,
        user_id: &str,
        method: MfaMethod,
        destination: &str,
    ) -> Result<(), IdentityError> {
        if method == MfaMethod::Totp {
            return Err(IdentityError::Invalid(
                "TOTP factors are enrolled with enroll_totp".to_string(),
            ));
        }
        let mut dir = self.directory()?;
        let user = dir
            .users
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::Invalid(format!("Unknown user {user_id}")))?;
        user.factor = Some(Factor::Code {
            method,
            destination: destination.to_string(),
        });
        Ok(())
    }

    /// Replace the user's backup codes; the plaintext is returned exactly once
    pub fn generate_backup_codes(
        &self,
        user_id: &str,
        count: usize,
    ) -> Result<Vec<String>, IdentityError> {
        let codes: Vec<String> = (0..count)
            .map(|_| {
                random_token()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .take(BACKUP_CODE_LEN)
                    .collect::<String>()
                    .to_lowercase()
            })
            .collect();

        let mut dir = self.directory()?;
        let user = dir
            .users
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::Invalid(format!("Unknown user {user_id}")))?;
        user.backup_codes = codes.iter().map(|c| hash_token(c)).collect();
        Ok(codes)
    }

    /// Code an authenticator app would show right now
    #[cfg(any(test, feature = "test-utils"))]
    pub fn current_totp_code(&self, user_id: &str) -> Option<String> {
        let dir = self.directory().ok()?;
        let user = dir.users.get(user_id)?;
        match &user.factor {
            Some(Factor::Totp { secret }) => build_totp(secret, &self.issuer, &user.email)
                .ok()?
                .generate_current()
                .ok(),
            _ => None,
        }
    }

    fn issue_tokens(
        &self,
        dir: &mut Directory,
        user: &UserProfile,
        session_id: Option<String>,
    ) -> Result<IssuedTokens, IdentityError> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let (access_token, claims) =
            jwt::generate_access_token(&self.jwt, &user.id, &user.email, &session_id)
                .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let refresh_token = random_token();
        dir.refresh_grants.insert(
            hash_token(&refresh_token),
            RefreshGrant {
                user_id: user.id.clone(),
                session_id,
                expires_at: Utc::now() + ChronoDuration::days(REFRESH_TOKEN_TTL_DAYS),
            },
        );

        Ok(IssuedTokens {
            user: user.clone(),
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: claims.expires_at(),
        })
    }

    /// Apply a password check result under the directory lock
    ///
    /// Returns the sign-in outcome plus any code that still has to be sent.
    fn finish_sign_in(
        &self,
        user_id: &str,
        password_matches: bool,
        now: DateTime<Utc>,
    ) -> Result<(SignInOutcome, Option<Delivery>), IdentityError> {
        let mut dir = self.directory()?;
        let Some(user) = dir.users.get_mut(user_id) else {
            return Err(IdentityError::InvalidCredentials {
                remaining_attempts: None,
            });
        };

        // A parallel sign-in may have locked the account while the hash was checked
        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            return Err(IdentityError::Locked {
                retry_after: (until - now).to_std().unwrap_or(self.lockout_duration),
            });
        }

        if !password_matches {
            user.failed_attempts += 1;
            if user.failed_attempts >= self.max_failed_attempts {
                user.failed_attempts = 0;
                user.locked_until = ChronoDuration::from_std(self.lockout_duration)
                    .ok()
                    .map(|lockout| now + lockout);
                warn!(user_id = %user.id, "Account locked after repeated failed sign-ins");
                return Err(IdentityError::Locked {
                    retry_after: self.lockout_duration,
                });
            }
            return Err(IdentityError::InvalidCredentials {
                remaining_attempts: Some(self.max_failed_attempts - user.failed_attempts),
            });
        }

        user.failed_attempts = 0;
        user.locked_until = None;

        if !user.email_verified {
            return Err(IdentityError::EmailNotVerified);
        }

        let profile = user.profile();
        let Some(factor) = user.factor.clone() else {
            let tokens = self.issue_tokens(&mut dir, &profile, None)?;
            return Ok((SignInOutcome::Authenticated(tokens), None));
        };

        let temp_token = random_token();
        let expires_at = now
            + ChronoDuration::from_std(self.mfa_challenge_ttl)
                .unwrap_or_else(|_| ChronoDuration::minutes(5));
        let (code_hash, outgoing) = match &factor {
            Factor::Totp { .. } => (None, None),
            Factor::Code {
                method,
                destination,
            } => {
                let code = random_numeric_code();
                let delivery = Delivery {
                    kind: DeliveryKind::MfaCode(*method),
                    recipient: destination.clone(),
                    secret: code.clone(),
                };
                (Some(hash_token(&code)), Some(delivery))
            }
        };

        dir.challenges.insert(
            hash_token(&temp_token),
            ChallengeRecord {
                user_id: profile.id.clone(),
                method: factor.method(),
                expires_at,
                attempts: 0,
                code_hash,
            },
        );

        debug!(user_id = %profile.id, method = %factor.method(), "Issued MFA challenge");
        let pending = PendingChallenge {
            user: profile,
            temp_token,
            method: factor.method(),
            expires_at,
        };
        Ok((SignInOutcome::MfaRequired(pending), outgoing))
    }

    fn check_access_token(
        &self,
        dir: &Directory,
        access_token: &str,
    ) -> Result<jwt::Claims, IdentityError> {
        let claims = jwt::validate_access_token(&self.jwt, access_token).map_err(reject)?;
        if dir.revoked.contains_key(&claims.jti) {
            return Err(IdentityError::Rejected("Token has been revoked".to_string()));
        }
        Ok(claims)
    }

    fn check_second_factor(
        &self,
        user: &mut UserRecord,
        challenge: &ChallengeRecord,
        code: &str,
        is_backup_code: bool,
    ) -> Result<Option<u32>, IdentityError> {
        if is_backup_code {
            let digest = hash_token(&normalize_backup_code(code));
            return match user.backup_codes.iter().position(|c| *c == digest) {
                Some(index) => {
                    user.backup_codes.remove(index);
                    Ok(Some(user.backup_codes.len() as u32))
                }
                None => Err(IdentityError::InvalidCode),
            };
        }

        let accepted = match &user.factor {
            Some(Factor::Totp { secret }) => build_totp(secret, &self.issuer, &user.email)?
                .check_current(code.trim())
                .unwrap_or(false),
            Some(Factor::Code { .. }) => challenge
                .code_hash
                .as_deref()
                .is_some_and(|expected| expected == hash_token(code.trim())),
            None => false,
        };

        if accepted {
            Ok(None)
        } else {
            Err(IdentityError::InvalidCode)
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, IdentityError> {
        let now = Utc::now();
        let (user_id, password_hash) = {
            let mut dir = self.directory()?;
            dir.prune(now);
            let Some(user) = dir.user_by_email(email) else {
                return Err(IdentityError::InvalidCredentials {
                    remaining_attempts: None,
                });
            };
            if let Some(until) = user.locked_until.filter(|until| *until > now) {
                return Err(IdentityError::Locked {
                    retry_after: (until - now).to_std().unwrap_or(self.lockout_duration),
                });
            }
            (user.id.clone(), user.password_hash.clone())
        };

        let matches = verify_password(password, &password_hash)
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let (outcome, outgoing) = self.finish_sign_in(&user_id, matches, now)?;
        if let Some(delivery) = outgoing {
            self.delivery.deliver(delivery).await?;
        }
        Ok(outcome)
    }

    async fn verify_mfa(
        &self,
        temp_token: &str,
        method: MfaMethod,
        code: &str,
        is_backup_code: bool,
    ) -> Result<MfaVerified, IdentityError> {
        let now = Utc::now();
        let key = hash_token(temp_token);
        let mut dir = self.directory()?;

        let Some(challenge) = dir.challenges.remove(&key) else {
            return Err(IdentityError::ChallengeExpired);
        };
        if challenge.expires_at <= now {
            return Err(IdentityError::ChallengeExpired);
        }
        if !is_backup_code && method != challenge.method {
            let expected = challenge.method;
            dir.challenges.insert(key, challenge);
            return Err(IdentityError::Invalid(format!(
                "Challenge expects a {expected} code"
            )));
        }

        let Some(mut user) = dir.users.get(&challenge.user_id).cloned() else {
            return Err(IdentityError::ChallengeExpired);
        };

        match self.check_second_factor(&mut user, &challenge, code, is_backup_code) {
            Ok(backup_codes_remaining) => {
                let profile = user.profile();
                dir.users.insert(user.id.clone(), user);
                let tokens = self.issue_tokens(&mut dir, &profile, None)?;
                Ok(MfaVerified {
                    tokens,
                    backup_codes_remaining,
                })
            }
            Err(err) => {
                let attempts = challenge.attempts + 1;
                if attempts < MAX_CHALLENGE_ATTEMPTS {
                    dir.challenges.insert(
                        key,
                        ChallengeRecord {
                            attempts,
                            ..challenge
                        },
                    );
                } else {
                    warn!(user_id = %challenge.user_id, "MFA challenge burned after repeated wrong codes");
                }
                Err(err)
            }
        }
    }

    async fn refresh(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<IssuedTokens, IdentityError> {
        let now = Utc::now();
        let mut dir = self.directory()?;

        let (user_id, session_id) = match (refresh_token, access_token) {
            (Some(refresh_token), _) => {
                let grant = dir
                    .refresh_grants
                    .remove(&hash_token(refresh_token))
                    .filter(|grant| grant.expires_at > now)
                    .ok_or_else(|| IdentityError::Rejected("Invalid refresh token".to_string()))?;
                if let Some(claims) =
                    access_token.and_then(|t| jwt::decode_expired_ok(&self.jwt, t).ok())
                {
                    dir.revoked.insert(claims.jti.clone(), claims.expires_at());
                }
                (grant.user_id, grant.session_id)
            }
            (None, Some(access_token)) => {
                let claims = self.check_access_token(&dir, access_token)?;
                dir.revoked.insert(claims.jti.clone(), claims.expires_at());
                (claims.sub, claims.sid)
            }
            (None, None) => return Err(IdentityError::Rejected("Missing credentials".to_string())),
        };

        let profile = dir
            .users
            .get(&user_id)
            .map(UserRecord::profile)
            .ok_or_else(|| IdentityError::Rejected("Unknown user".to_string()))?;
        self.issue_tokens(&mut dir, &profile, Some(session_id))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let claims = jwt::decode_expired_ok(&self.jwt, access_token).map_err(reject)?;
        let mut dir = self.directory()?;
        dir.revoked.insert(claims.jti.clone(), claims.expires_at());
        dir.refresh_grants
            .retain(|_, grant| grant.session_id != claims.sid);
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<UserProfile, IdentityError> {
        validate_password_strength(password).map_err(IdentityError::Invalid)?;
        if self.directory()?.user_by_email(email).is_some() {
            return Err(IdentityError::Conflict);
        }

        let password_hash = hash_password_with_config(password, &self.password)
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let (profile, token) = {
            let mut dir = self.directory()?;
            let user_id = insert_user(&mut dir, email, password_hash, name, false)?;
            let token = issue_verification_token(&mut dir, &user_id);
            let profile = dir
                .users
                .get(&user_id)
                .map(UserRecord::profile)
                .ok_or_else(|| IdentityError::Unavailable("user vanished".to_string()))?;
            (profile, token)
        };

        self.delivery
            .deliver(Delivery {
                kind: DeliveryKind::EmailVerification,
                recipient: profile.email.clone(),
                secret: token,
            })
            .await?;
        Ok(profile)
    }

    async fn confirm_email(&self, token: &str) -> Result<(), IdentityError> {
        let now = Utc::now();
        let mut dir = self.directory()?;
        let record = dir
            .verification_tokens
            .remove(&hash_token(token))
            .filter(|record| record.expires_at > now)
            .ok_or_else(|| {
                IdentityError::Invalid("Invalid or expired verification token".to_string())
            })?;

        if let Some(user) = dir.users.get_mut(&record.user_id) {
            user.email_verified = true;
        }
        dir.verification_tokens
            .retain(|_, pending| pending.user_id != record.user_id);
        Ok(())
    }

    async fn resend_verification(&self, email: &str) -> Result<(), IdentityError> {
        let outgoing = {
            let mut dir = self.directory()?;
            match dir.user_by_email(email) {
                Some(user) if !user.email_verified => {
                    let (user_id, recipient) = (user.id.clone(), user.email.clone());
                    Some((recipient, issue_verification_token(&mut dir, &user_id)))
                }
                _ => None,
            }
        };

        if let Some((recipient, secret)) = outgoing {
            self.delivery
                .deliver(Delivery {
                    kind: DeliveryKind::EmailVerification,
                    recipient,
                    secret,
                })
                .await?;
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, IdentityError> {
        let dir = self.directory()?;
        let claims = self.check_access_token(&dir, access_token)?;
        let user = dir
            .users
            .get(&claims.sub)
            .ok_or_else(|| IdentityError::Rejected("Unknown user".to_string()))?;

        Ok(Identity {
            id: user.id.clone(),
            email: user.email.clone(),
            app_metadata: json!({
                "provider": "local",
                "session_id": claims.sid,
            }),
        })
    }
}

fn reject(err: JwtError) -> IdentityError {
    IdentityError::Rejected(err.to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn build_totp(secret: &[u8], issuer: &str, account: &str) -> Result<TOTP, IdentityError> {
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret.to_vec(),
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| IdentityError::Unavailable(format!("TOTP init error: {e}")))
}

fn insert_user(
    dir: &mut Directory,
    email: &str,
    password_hash: String,
    name: Option<&str>,
    email_verified: bool,
) -> Result<String, IdentityError> {
    let key = normalize_email(email);
    if dir.by_email.contains_key(&key) {
        return Err(IdentityError::Conflict);
    }

    let id = Uuid::new_v4().to_string();
    dir.users.insert(
        id.clone(),
        UserRecord {
            id: id.clone(),
            email: email.trim().to_string(),
            name: name.map(str::to_string),
            password_hash,
            email_verified,
            failed_attempts: 0,
            locked_until: None,
            factor: None,
            backup_codes: Vec::new(),
        },
    );
    dir.by_email.insert(key, id.clone());
    Ok(id)
}

fn issue_verification_token(dir: &mut Directory, user_id: &str) -> String {
    let token = random_token();
    dir.verification_tokens.insert(
        hash_token(&token),
        VerificationRecord {
            user_id: user_id.to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(VERIFICATION_TOKEN_TTL_HOURS),
        },
    );
    token
}
