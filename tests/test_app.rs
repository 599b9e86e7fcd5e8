use tuby::app::{Application, RegistrationError, Registrar, load};
use tuby::http::environment::Environment;
use tuby::http::request::RequestBuilder;
use tuby::http::response::Response;

struct Greeter {
    greeting: &'static str,
}

impl Application for Greeter {
    fn call(&self, env: Environment) -> anyhow::Result<Response> {
        Ok(Response::ok(format!("{} {}", self.greeting, env.path())))
    }
}

fn env_for(path: &str) -> Environment {
    Environment::from_request(&RequestBuilder::new().method("GET").path(path).build().unwrap())
}

#[test]
fn test_load_returns_registered_application() {
    let app = load(|r: &mut Registrar| r.register(Greeter { greeting: "hi" })).unwrap();

    let response = app.call(env_for("/there")).unwrap();
    assert_eq!(response.status, 200);
}

#[test]
fn test_load_accepts_closures() {
    let app = load(|r: &mut Registrar| {
        r.register_fn(|env| Ok(Response::builder(404).header("X-Path", env.path()).build()))
    })
    .unwrap();

    let response = app.call(env_for("/missing")).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.headers, vec![("X-Path".to_string(), "/missing".to_string())]);
}

#[test]
fn test_load_without_registration_fails() {
    let result = load(|_r: &mut Registrar| {});

    assert_eq!(result.err(), Some(RegistrationError::Missing));
}

#[test]
fn test_load_with_two_registrations_fails() {
    let result = load(|r: &mut Registrar| {
        r.register(Greeter { greeting: "one" });
        r.register(Greeter { greeting: "two" });
    });

    assert_eq!(result.err(), Some(RegistrationError::Duplicate));
}
