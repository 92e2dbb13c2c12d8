#[macro_use]
extern crate rocket;

use rocket::{
    http::{Cookie, SameSite, Status},
    local::blocking::Client,
    time::Duration,
    {routes, Build, Rocket},
};
use rocket_db_session::{RocketDbSession, RocketDbSessionOptions, Session};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
}

#[get("/get_session")]
fn get_session(session: Session) -> String {
    match session.get_key::<User>("user") {
        Some(user) => format!("User: {} ({})", user.name, user.id),
        None => "No session".to_string(),
    }
}

#[post("/set_session")]
fn set_session(mut session: Session) -> String {
    session.set_key(
        "user",
        User {
            id: "123".to_string(),
            name: "Test User".to_string(),
        },
    );
    format!("new: {}, id: {:?}", session.is_new(), session.id())
}

#[post("/delete_session")]
fn delete_session(mut session: Session) -> &'static str {
    session.delete();
    "Session deleted"
}

#[post("/visit")]
fn visit(mut session: Session) -> String {
    let visits = session
        .tap_mut(|data| {
            let data = data.get_or_insert_with(Default::default);
            let visits = data.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
            data.insert("visits".to_owned(), json!(visits));
            visits
        });
    visits.to_string()
}

#[post("/remove_visits")]
fn remove_visits(mut session: Session) -> String {
    let removed = session.remove_key("visits");
    let remaining = session.tap(|data| data.map(|d| d.len()));
    format!("removed: {removed:?}, remaining: {remaining:?}")
}

#[get("/session_id")]
fn session_id(session: Session) -> String {
    format!("{:?}", session.id())
}

fn create_rocket(options: RocketDbSessionOptions) -> Rocket<Build> {
    rocket::build()
        .attach(RocketDbSession::builder().options(options).build())
        .mount(
            "/",
            routes![
                get_session,
                set_session,
                delete_session,
                visit,
                remove_visits,
                session_id,
            ],
        )
}

fn default_rocket() -> Rocket<Build> {
    create_rocket(RocketDbSessionOptions::default())
}

#[test]
fn test_empty_session() {
    let client = Client::tracked(default_rocket()).unwrap();
    let response = client.get("/get_session").dispatch();

    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get("rocket_session").is_none());
    assert_eq!(response.into_string().unwrap(), "No session");
}

#[test]
fn test_set_and_get_session() {
    let client = Client::tracked(default_rocket()).unwrap();

    // Set session
    let set_response = client.post("/set_session").dispatch();
    assert_eq!(set_response.status(), Status::Ok);

    // Verify cookie was set
    let cookie = set_response
        .cookies()
        .get("rocket_session")
        .expect("should have session cookie")
        .clone();
    assert_eq!(cookie.value().len(), 128);
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.max_age(), Some(Duration::days(14)));

    // Identifier is only known once the session is stored
    assert_eq!(set_response.into_string().unwrap(), "new: true, id: None");

    // Get session
    let get_response = client.get("/get_session").dispatch();
    assert_eq!(get_response.status(), Status::Ok);
    assert_eq!(get_response.into_string().unwrap(), "User: Test User (123)");

    let id_response = client.get("/session_id").dispatch();
    assert_eq!(
        id_response.into_string().unwrap(),
        format!("{:?}", Some(cookie.value()))
    );
}

#[test]
fn test_update_keeps_identifier() {
    let client = Client::tracked(default_rocket()).unwrap();

    let first = client.post("/visit").dispatch();
    let first_id = first.cookies().get("rocket_session").unwrap().value().to_owned();
    assert_eq!(first.into_string().unwrap(), "1");

    let second = client.post("/visit").dispatch();
    let second_id = second.cookies().get("rocket_session").unwrap().value().to_owned();
    assert_eq!(second.into_string().unwrap(), "2");
    assert_eq!(first_id, second_id);
}

#[test]
fn test_remove_key() {
    let client = Client::tracked(default_rocket()).unwrap();

    let response = client.post("/remove_visits").dispatch();
    assert_eq!(
        response.into_string().unwrap(),
        "removed: None, remaining: None"
    );

    client.post("/visit").dispatch();
    let response = client.post("/remove_visits").dispatch();
    assert_eq!(
        response.into_string().unwrap(),
        "removed: Some(Number(1)), remaining: Some(0)"
    );
}

#[test]
fn test_delete_session() {
    let client = Client::tracked(default_rocket()).unwrap();

    // Set then delete session
    client.post("/set_session").dispatch();
    let delete_response = client.post("/delete_session").dispatch();
    assert_eq!(delete_response.status(), Status::Ok);

    // Verify the cookie is removed
    let removal = delete_response
        .cookies()
        .get("rocket_session")
        .expect("should have removal cookie");
    assert_eq!(removal.value(), "");
    assert_eq!(removal.max_age(), Some(Duration::ZERO));

    // Verify session is deleted
    let get_response = client.get("/get_session").dispatch();
    assert_eq!(get_response.into_string().unwrap(), "No session");
}

#[test]
fn test_deleted_session_is_gone_from_store() {
    let client = Client::untracked(default_rocket()).unwrap();

    let set_response = client.post("/set_session").dispatch();
    let id = set_response.cookies().get("rocket_session").unwrap().value().to_owned();

    client
        .post("/delete_session")
        .cookie(Cookie::new("rocket_session", id.clone()))
        .dispatch();

    // Replaying the old cookie doesn't bring the session back
    let replayed = client
        .get("/get_session")
        .cookie(Cookie::new("rocket_session", id))
        .dispatch();
    assert_eq!(replayed.into_string().unwrap(), "No session");
}

#[test]
fn test_forged_cookie() {
    let client = Client::untracked(default_rocket()).unwrap();

    let response = client
        .get("/get_session")
        .cookie(Cookie::new("rocket_session", "forged"))
        .dispatch();
    let removal = response
        .cookies()
        .get("rocket_session")
        .expect("should remove unknown session cookie");
    assert_eq!(removal.value(), "");
    assert_eq!(response.into_string().unwrap(), "No session");

    // Writing with an unknown identifier creates a fresh session
    let response = client
        .post("/set_session")
        .cookie(Cookie::new("rocket_session", "forged"))
        .dispatch();
    let cookie = response.cookies().get("rocket_session").unwrap();
    assert_ne!(cookie.value(), "forged");
    assert_eq!(cookie.value().len(), 128);
}

#[test]
fn test_custom_cookie_options() {
    let options = RocketDbSessionOptions {
        cookie_name: "my_session".to_owned(),
        domain: Some("example.com".to_owned()),
        http_only: false,
        path: "/app".to_owned(),
        same_site: SameSite::Strict,
        secure: false,
        ..Default::default()
    };
    let client = Client::untracked(create_rocket(options)).unwrap();

    let response = client.post("/set_session").dispatch();
    assert!(response.cookies().get("rocket_session").is_none());
    let cookie = response.cookies().get("my_session").unwrap();
    assert_eq!(cookie.domain(), Some("example.com"));
    assert_eq!(cookie.path(), Some("/app"));
    assert_eq!(cookie.http_only(), None);
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
}

#[test]
fn test_rolling_cookie() {
    let client = Client::untracked(default_rocket()).unwrap();
    let id = client
        .post("/set_session")
        .dispatch()
        .cookies()
        .get("rocket_session")
        .unwrap()
        .value()
        .to_owned();
    let response = client
        .get("/get_session")
        .cookie(Cookie::new("rocket_session", id))
        .dispatch();
    assert!(
        response.cookies().get("rocket_session").is_none(),
        "Cookie isn't re-sent for unchanged session"
    );

    let rolling = RocketDbSessionOptions {
        rolling: true,
        ..Default::default()
    };
    let client = Client::untracked(create_rocket(rolling)).unwrap();
    let id = client
        .post("/set_session")
        .dispatch()
        .cookies()
        .get("rocket_session")
        .unwrap()
        .value()
        .to_owned();
    let response = client
        .get("/get_session")
        .cookie(Cookie::new("rocket_session", id.clone()))
        .dispatch();
    let cookie = response
        .cookies()
        .get("rocket_session")
        .expect("Cookie is re-sent for rolling session");
    assert_eq!(cookie.value(), id);
    assert_eq!(cookie.max_age(), Some(Duration::days(14)));
}
