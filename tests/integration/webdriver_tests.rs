//! WebDriver client and catalog driver against a mock WebDriver endpoint

use catalog_harvest::codes::Code;
use catalog_harvest::config::parse_config;
use catalog_harvest::crawler::ScanDirection;
use catalog_harvest::driver::{
    CatalogDriverFactory, Driver, DriverError, DriverFactory, WebDriverSession, ELEMENT_KEY,
};
use catalog_harvest::state::Variant;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
}

fn element(id: &str) -> ResponseTemplate {
    ok(json!({ (ELEMENT_KEY): id }))
}

fn no_such_element() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "value": { "error": "no such element", "message": "Unable to locate element" }
    }))
}

fn by_css(css: &str) -> Value {
    json!({ "using": "css selector", "value": css })
}

async fn mount_session(server: &MockServer, id: &str) {
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ok(json!({ "sessionId": id, "capabilities": {} })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("/session/{}", id)))
        .respond_with(ok(Value::Null))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_session_lifecycle() {
    let server = MockServer::start().await;
    mount_session(&server, "s1").await;

    Mock::given(method("POST"))
        .and(path("/session/s1/url"))
        .respond_with(ok(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session/s1/element"))
        .and(body_json(by_css("#present")))
        .respond_with(element("el-1"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session/s1/element"))
        .and(body_json(by_css("#missing")))
        .respond_with(no_such_element())
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/session/s1/element/el-1/text"))
        .respond_with(ok(json!("hello")))
        .mount(&server)
        .await;

    let session = WebDriverSession::start(&server.uri(), json!({ "browserName": "chrome" }))
        .await
        .unwrap();
    assert_eq!(session.session_id(), "s1");

    session.navigate("https://catalog.example.com/").await.unwrap();

    let found = session.find_element("#present").await.unwrap();
    assert_eq!(found.as_deref(), Some("el-1"));
    assert_eq!(session.text("el-1").await.unwrap(), "hello");

    assert_eq!(session.find_element("#missing").await.unwrap(), None);

    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_refused_session_is_an_init_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "value": { "error": "session not created", "message": "cannot find Chrome binary" }
        })))
        .mount(&server)
        .await;

    let result = WebDriverSession::start(&server.uri(), json!({})).await;

    match result {
        Err(DriverError::Init(message)) => assert!(message.contains("cannot find Chrome binary")),
        Err(other) => panic!("expected an init error, got {}", other),
        Ok(_) => panic!("expected the session to be refused"),
    }
}

#[tokio::test]
async fn test_catalog_search_reads_result_count() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let config = parse_config(&format!(
        r#"
[catalog]
base-url = "{uri}/index_as.php"

[download]
root = "{root}"

[scan]
codes-path = "./codes.md"

[state]

[driver]
webdriver-url = "{uri}"
element-timeout-ms = 100
settle-ms = 0
"#,
        uri = server.uri(),
        root = dir.path().display()
    ))
    .unwrap();

    mount_session(&server, "s2").await;

    for (suffix, response) in [
        ("url", ok(Value::Null)),
        ("chromium/send_command", ok(Value::Null)),
        ("element/lang/element", element("opt-tw")),
        ("element/opt-tw/click", ok(Value::Null)),
        ("element/query/clear", ok(Value::Null)),
        ("element/query/value", ok(Value::Null)),
        ("element/go/click", ok(Value::Null)),
    ] {
        Mock::given(method("POST"))
            .and(path(format!("/session/s2/{}", suffix)))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    let selectors = &config.driver.selectors;
    for (css, response) in [
        (selectors.language_select.as_str(), element("lang")),
        (selectors.search_input.as_str(), element("query")),
        (selectors.search_button.as_str(), element("go")),
        (selectors.page_size.as_str(), no_such_element()),
        (selectors.result_count.as_str(), element("count")),
    ] {
        Mock::given(method("POST"))
            .and(path("/session/s2/element"))
            .and(body_json(by_css(css)))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/session/s2/element/count/text"))
        .respond_with(ok(json!("共發現 12 筆資料，耗時 0.02 秒")))
        .mount(&server)
        .await;

    let factory = CatalogDriverFactory::new(&config).unwrap();
    let mut driver = factory.launch(ScanDirection::Forward).await.unwrap();

    let code = Code::new("02-037-0001");
    let variant = Variant::new("zh_TW");
    driver
        .set_download_dir(&dir.path().join(code.as_str()).join(variant.as_str()))
        .await
        .unwrap();
    assert!(dir.path().join("02-037-0001/zh_TW").is_dir());

    let total = driver.search(&code, &variant).await.unwrap();
    assert_eq!(total, 12);

    driver.close().await.unwrap();
}
