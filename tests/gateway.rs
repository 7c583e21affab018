//! End-to-end tests executing GraphQL operations against the built schema,
//! with an in-memory store and a scripted identity service.

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::Request;
use async_trait::async_trait;
use gallery_gateway::auth::AuthenticatedUser;
use gallery_gateway::types::{AuthPayload, Credentials, RegisterInput, UpdateUserInput};
use gallery_gateway::{
    build_schema, Caller, Config, Fanout, GatewayError, GatewaySchema, IdentityApi, Result, Role,
    SharedIdentity, Topic, User, UserId,
};
use serde_json::Value;

struct MockIdentity {
    users: Vec<User>,
    tokens: HashMap<String, UserId>,
    passwords: HashMap<String, String>,
}

impl MockIdentity {
    fn with_users(users: Vec<User>) -> Arc<Self> {
        let tokens = users
            .iter()
            .map(|u| (format!("token-{}", u.user_name), u.id.clone()))
            .collect();
        let passwords = users
            .iter()
            .map(|u| (u.user_name.clone(), format!("pw-{}", u.user_name)))
            .collect();
        Arc::new(Self {
            users,
            tokens,
            passwords,
        })
    }

    fn by_id(&self, id: &UserId) -> Result<User> {
        self.users
            .iter()
            .find(|u| &u.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("User"))
    }

    fn payload(&self, user: User, token: Option<String>, message: &str) -> AuthPayload {
        AuthPayload {
            token,
            message: message.to_string(),
            user,
        }
    }
}

#[async_trait]
impl IdentityApi for MockIdentity {
    async fn get_user(&self, id: &UserId) -> Result<User> {
        self.by_id(id)
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    async fn validate_token(&self, token: &str) -> Result<User> {
        let id = self.tokens.get(token).ok_or(GatewayError::Unauthorized)?;
        self.by_id(id)
    }

    async fn login(&self, credentials: Credentials) -> Result<AuthPayload> {
        let expected = self
            .passwords
            .get(&credentials.username)
            .ok_or(GatewayError::Unauthorized)?;
        if expected != &credentials.password {
            return Err(GatewayError::Unauthorized);
        }
        let user = self
            .users
            .iter()
            .find(|u| u.user_name == credentials.username)
            .cloned()
            .ok_or(GatewayError::Unauthorized)?;
        let token = Some(format!("token-{}", user.user_name));
        Ok(self.payload(user, token, "Login successful"))
    }

    async fn register(&self, input: RegisterInput) -> Result<AuthPayload> {
        let user = User {
            id: UserId::new(&input.user_name),
            user_name: input.user_name.clone(),
            email: input.email,
            role: Role::Member,
        };
        let token = Some(format!("token-{}", input.user_name));
        Ok(self.payload(user, token, "User registered"))
    }

    async fn update_user(&self, token: &str, _input: UpdateUserInput) -> Result<AuthPayload> {
        let user = self.validate_token(token).await?;
        Ok(self.payload(user, None, "User updated"))
    }

    async fn delete_user(&self, token: &str) -> Result<AuthPayload> {
        let user = self.validate_token(token).await?;
        Ok(self.payload(user, None, "User deleted"))
    }

    async fn update_user_as_admin(
        &self,
        _token: &str,
        id: &UserId,
        _input: UpdateUserInput,
    ) -> Result<AuthPayload> {
        Ok(self.payload(self.by_id(id)?, None, "User updated"))
    }

    async fn delete_user_as_admin(&self, _token: &str, id: &UserId) -> Result<AuthPayload> {
        Ok(self.payload(self.by_id(id)?, None, "User deleted"))
    }
}

/// Identity service that is unreachable for every call.
struct DownIdentity;

#[async_trait]
impl IdentityApi for DownIdentity {
    async fn get_user(&self, _id: &UserId) -> Result<User> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn validate_token(&self, _token: &str) -> Result<User> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn login(&self, _credentials: Credentials) -> Result<AuthPayload> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn register(&self, _input: RegisterInput) -> Result<AuthPayload> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn update_user(&self, _token: &str, _input: UpdateUserInput) -> Result<AuthPayload> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn delete_user(&self, _token: &str) -> Result<AuthPayload> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn update_user_as_admin(
        &self,
        _token: &str,
        _id: &UserId,
        _input: UpdateUserInput,
    ) -> Result<AuthPayload> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }

    async fn delete_user_as_admin(&self, _token: &str, _id: &UserId) -> Result<AuthPayload> {
        Err(GatewayError::Unavailable("connection refused".into()))
    }
}

fn user(name: &str, role: Role) -> User {
    User {
        id: UserId::new(name),
        user_name: name.to_string(),
        email: format!("{name}@example.com"),
        role,
    }
}

fn test_config() -> Config {
    Config {
        login_max_attempts: 3,
        ..Config::default()
    }
}

fn setup() -> (GatewaySchema, Fanout) {
    let identity: SharedIdentity = MockIdentity::with_users(vec![
        user("alice", Role::Member),
        user("bob", Role::Member),
        user("root", Role::Admin),
    ]);
    let fanout = Fanout::new(16);
    let schema = build_schema(identity, fanout.clone(), &test_config());
    (schema, fanout)
}

fn caller(name: &str, role: Role) -> Caller {
    Caller::User(AuthenticatedUser {
        id: UserId::new(name),
        role,
        token: format!("token-{name}"),
    })
}

async fn exec(schema: &GatewaySchema, caller: Caller, query: &str) -> async_graphql::Response {
    schema.execute(Request::new(query).data(caller)).await
}

fn data(response: &async_graphql::Response) -> Value {
    response.data.clone().into_json().unwrap()
}

fn error_code(response: &async_graphql::Response) -> String {
    let errors = serde_json::to_value(&response.errors).unwrap();
    errors[0]["extensions"]["code"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

async fn create_picture(schema: &GatewaySchema, as_caller: Caller) -> String {
    let response = exec(
        schema,
        as_caller,
        r#"mutation { createPicture(input: {title: "t", description: "d", filename: "f.jpg"}) { id } }"#,
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    data(&response)["createPicture"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn create_picture_stamps_owner_from_caller() {
    let (schema, _) = setup();
    let response = exec(
        &schema,
        caller("alice", Role::Member),
        r#"mutation {
            createPicture(input: {title: "t", description: "d", filename: "f.jpg"}) {
                id title description filename createdAt
                owner { id userName }
            }
        }"#,
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let picture = &data(&response)["createPicture"];
    assert_eq!(picture["title"], "t");
    assert_eq!(picture["owner"]["id"], "alice");
    assert_eq!(picture["owner"]["userName"], "alice");
    assert!(picture["id"].as_str().is_some());
}

#[tokio::test]
async fn non_owner_update_is_unauthorized_and_record_unchanged() {
    let (schema, _) = setup();
    let id = create_picture(&schema, caller("alice", Role::Member)).await;

    let attempt = exec(
        &schema,
        caller("bob", Role::Member),
        &format!(r#"mutation {{ updatePicture(id: "{id}", input: {{title: "x"}}) {{ id }} }}"#),
    )
    .await;
    assert_eq!(error_code(&attempt), "UNAUTHORIZED");

    let read = exec(
        &schema,
        Caller::Anonymous,
        &format!(r#"query {{ pictureById(id: "{id}") {{ title }} }}"#),
    )
    .await;
    assert_eq!(data(&read)["pictureById"]["title"], "t");

    // the owner's update is a partial merge
    let update = exec(
        &schema,
        caller("alice", Role::Member),
        &format!(
            r#"mutation {{ updatePicture(id: "{id}", input: {{title: "x"}}) {{ title description filename }} }}"#
        ),
    )
    .await;
    assert!(update.errors.is_empty(), "{:?}", update.errors);
    let picture = &data(&update)["updatePicture"];
    assert_eq!(picture["title"], "x");
    assert_eq!(picture["description"], "d");
    assert_eq!(picture["filename"], "f.jpg");
}

#[tokio::test]
async fn anonymous_create_profile_is_unauthorized() {
    let (schema, _) = setup();
    let response = exec(
        &schema,
        Caller::Anonymous,
        r#"mutation { createProfile(input: {about: "hi"}) { id } }"#,
    )
    .await;
    assert_eq!(error_code(&response), "UNAUTHORIZED");
}

#[tokio::test]
async fn follow_graph_conflicts_and_round_trip() {
    let (schema, _) = setup();
    let alice = || caller("alice", Role::Member);

    exec(&schema, alice(), r#"mutation { createProfile(input: {}) { id } }"#).await;

    let add = exec(
        &schema,
        alice(),
        r#"mutation { addFollow(id: "bob") { follows { id } } }"#,
    )
    .await;
    assert!(add.errors.is_empty(), "{:?}", add.errors);
    assert_eq!(data(&add)["addFollow"]["follows"][0]["id"], "bob");

    // second add reports the conflict and leaves the set unchanged
    let again = exec(
        &schema,
        alice(),
        r#"mutation { addFollow(id: "bob") { id } }"#,
    )
    .await;
    assert_eq!(error_code(&again), "ALREADY_FOLLOWING");

    let read = exec(
        &schema,
        Caller::Anonymous,
        r#"query { profileByOwner(owner: "alice") { follows { id } } }"#,
    )
    .await;
    assert_eq!(
        data(&read)["profileByOwner"][0]["follows"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    // remove restores the pre-add state
    let remove = exec(
        &schema,
        alice(),
        r#"mutation { removeFollow(id: "bob") { follows { id } } }"#,
    )
    .await;
    assert!(remove.errors.is_empty(), "{:?}", remove.errors);
    assert!(data(&remove)["removeFollow"]["follows"]
        .as_array()
        .unwrap()
        .is_empty());

    let absent = exec(
        &schema,
        alice(),
        r#"mutation { removeFollow(id: "bob") { id } }"#,
    )
    .await;
    assert_eq!(error_code(&absent), "NOT_FOLLOWING");
}

#[tokio::test]
async fn comments_track_their_picture() {
    let (schema, _) = setup();
    let picture_id = create_picture(&schema, caller("alice", Role::Member)).await;

    // commenting on someone else's picture is allowed
    let created = exec(
        &schema,
        caller("bob", Role::Member),
        &format!(
            r#"mutation {{ createComment(input: {{text: "hi", picture: "{picture_id}"}}) {{ id text owner {{ id }} picture {{ id }} }} }}"#
        ),
    )
    .await;
    assert!(created.errors.is_empty(), "{:?}", created.errors);
    let comment = &data(&created)["createComment"];
    assert_eq!(comment["owner"]["id"], "bob");
    assert_eq!(comment["picture"]["id"], picture_id);
    let comment_id = comment["id"].as_str().unwrap().to_string();

    let by_picture = exec(
        &schema,
        Caller::Anonymous,
        &format!(r#"query {{ commentsByPicture(pictureId: "{picture_id}") {{ id }} }}"#),
    )
    .await;
    assert_eq!(
        data(&by_picture)["commentsByPicture"][0]["id"],
        comment_id.as_str()
    );

    // only the comment's owner can delete it
    let denied = exec(
        &schema,
        caller("alice", Role::Member),
        &format!(r#"mutation {{ deleteComment(id: "{comment_id}") {{ id }} }}"#),
    )
    .await;
    assert_eq!(error_code(&denied), "UNAUTHORIZED");

    let deleted = exec(
        &schema,
        caller("bob", Role::Member),
        &format!(r#"mutation {{ deleteComment(id: "{comment_id}") {{ id text }} }}"#),
    )
    .await;
    assert!(deleted.errors.is_empty(), "{:?}", deleted.errors);
    assert_eq!(data(&deleted)["deleteComment"]["text"], "hi");

    let emptied = exec(
        &schema,
        Caller::Anonymous,
        &format!(r#"query {{ commentsByPicture(pictureId: "{picture_id}") {{ id }} }}"#),
    )
    .await;
    assert!(data(&emptied)["commentsByPicture"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn comment_on_missing_picture_is_not_found() {
    let (schema, _) = setup();
    let response = exec(
        &schema,
        caller("bob", Role::Member),
        r#"mutation { createComment(input: {text: "hi", picture: "00000000-0000-0000-0000-000000000000"}) { id } }"#,
    )
    .await;
    assert_eq!(error_code(&response), "NOT_FOUND");
}

#[tokio::test]
async fn repeated_failed_logins_are_rate_limited() {
    let (schema, _) = setup();
    let bad = r#"mutation { login(credentials: {username: "alice", password: "wrong"}) { token } }"#;

    for _ in 0..3 {
        let response = exec(&schema, Caller::Anonymous, bad).await;
        assert_eq!(error_code(&response), "UNAUTHORIZED");
    }

    // window is tripped: even correct credentials are rejected, distinctly
    let good =
        r#"mutation { login(credentials: {username: "alice", password: "pw-alice"}) { token } }"#;
    let response = exec(&schema, Caller::Anonymous, good).await;
    assert_eq!(error_code(&response), "RATE_LIMITED");

    // other usernames are unaffected
    let other =
        r#"mutation { login(credentials: {username: "bob", password: "pw-bob"}) { token message } }"#;
    let response = exec(&schema, Caller::Anonymous, other).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(data(&response)["login"]["token"], "token-bob");
}

#[tokio::test]
async fn dangling_owner_fails_only_that_field() {
    let (schema, _) = setup();
    let picture_id = create_picture(&schema, caller("alice", Role::Member)).await;

    // "ghost" authenticated upstream but no longer exists in the identity
    // service: its comment is readable, only the owner field fails
    exec(
        &schema,
        caller("ghost", Role::Member),
        &format!(r#"mutation {{ createComment(input: {{text: "boo", picture: "{picture_id}"}}) {{ id }} }}"#),
    )
    .await;

    let response = exec(
        &schema,
        Caller::Anonymous,
        r#"query { comments { text owner { id } } }"#,
    )
    .await;
    assert!(!response.errors.is_empty());
    assert_eq!(error_code(&response), "NOT_FOUND");

    let comments = data(&response)["comments"].as_array().unwrap().clone();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], "boo");
    assert!(comments[0]["owner"].is_null());
}

#[tokio::test]
async fn admin_operations_are_role_gated() {
    let (schema, _) = setup();

    let denied = exec(
        &schema,
        caller("bob", Role::Member),
        r#"mutation { deleteUserAsAdmin(id: "alice") { message } }"#,
    )
    .await;
    assert_eq!(error_code(&denied), "UNAUTHORIZED");

    let allowed = exec(
        &schema,
        caller("root", Role::Admin),
        r#"mutation { deleteUserAsAdmin(id: "alice") { message user { id } } }"#,
    )
    .await;
    assert!(allowed.errors.is_empty(), "{:?}", allowed.errors);
    assert_eq!(data(&allowed)["deleteUserAsAdmin"]["user"]["id"], "alice");
}

#[tokio::test]
async fn check_token_requires_authentication() {
    let (schema, _) = setup();

    let anonymous = exec(&schema, Caller::Anonymous, "query { checkToken { id } }").await;
    assert_eq!(error_code(&anonymous), "UNAUTHORIZED");

    let authenticated = exec(
        &schema,
        caller("alice", Role::Member),
        "query { checkToken { id userName } }",
    )
    .await;
    assert!(authenticated.errors.is_empty(), "{:?}", authenticated.errors);
    assert_eq!(data(&authenticated)["checkToken"]["id"], "alice");
}

#[tokio::test]
async fn user_queries_proxy_the_identity_service() {
    let (schema, _) = setup();

    let users = exec(&schema, Caller::Anonymous, "query { users { id } }").await;
    assert_eq!(data(&users)["users"].as_array().unwrap().len(), 3);

    let search = exec(
        &schema,
        Caller::Anonymous,
        r#"query { searchUsers(search: "ALI") { userName } }"#,
    )
    .await;
    let hits = data(&search)["searchUsers"].as_array().unwrap().clone();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["userName"], "alice");

    let missing = exec(
        &schema,
        Caller::Anonymous,
        r#"query { userById(id: "nobody") { id } }"#,
    )
    .await;
    assert_eq!(error_code(&missing), "NOT_FOUND");
}

#[tokio::test]
async fn unavailable_identity_is_never_swallowed_for_queries() {
    let identity: SharedIdentity = Arc::new(DownIdentity);
    let fanout = Fanout::new(16);
    let schema = build_schema(identity, fanout, &test_config());

    let response = exec(&schema, Caller::Anonymous, "query { users { id } }").await;
    assert_eq!(error_code(&response), "UNAVAILABLE");
}

#[tokio::test]
async fn each_successful_mutation_emits_one_topic_event() {
    let (schema, fanout) = setup();
    let mut rx = fanout.subscribe();

    let picture_id = create_picture(&schema, caller("alice", Role::Member)).await;
    assert_eq!(rx.try_recv().unwrap(), Topic::Pictures);
    assert!(rx.try_recv().is_err());

    exec(
        &schema,
        caller("bob", Role::Member),
        &format!(r#"mutation {{ createComment(input: {{text: "hi", picture: "{picture_id}"}}) {{ id }} }}"#),
    )
    .await;
    assert_eq!(rx.try_recv().unwrap(), Topic::Comments);
    assert!(rx.try_recv().is_err());

    // a rejected mutation emits nothing
    exec(
        &schema,
        Caller::Anonymous,
        r#"mutation { createProfile(input: {}) { id } }"#,
    )
    .await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn profile_update_merges_and_preserves_follows() {
    let (schema, _) = setup();
    let alice = || caller("alice", Role::Member);

    exec(
        &schema,
        alice(),
        r#"mutation { createProfile(input: {about: "hi", interests: ["a", "b"]}) { id } }"#,
    )
    .await;
    exec(&schema, alice(), r#"mutation { addFollow(id: "bob") { id } }"#).await;

    let read = exec(
        &schema,
        Caller::Anonymous,
        r#"query { profileByOwner(owner: "alice") { id about interests owner { id } } }"#,
    )
    .await;
    let profile = data(&read)["profileByOwner"][0].clone();
    assert_eq!(profile["about"], "hi");
    assert_eq!(profile["owner"]["id"], "alice");
    let id = profile["id"].as_str().unwrap().to_string();

    let update = exec(
        &schema,
        alice(),
        &format!(
            r#"mutation {{ updateProfile(id: "{id}", input: {{location: "Helsinki"}}) {{ about location interests follows {{ id }} }} }}"#
        ),
    )
    .await;
    assert!(update.errors.is_empty(), "{:?}", update.errors);
    let updated = &data(&update)["updateProfile"];
    assert_eq!(updated["about"], "hi");
    assert_eq!(updated["location"], "Helsinki");
    assert_eq!(updated["interests"].as_array().unwrap().len(), 2);
    assert_eq!(updated["follows"][0]["id"], "bob");
}
