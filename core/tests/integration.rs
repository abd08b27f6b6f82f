//! End-to-end tests against the mock ICD server.
//!
//! # Design
//! Each test starts the mock server on a random port in a background tokio
//! runtime, then drives the blocking `Api` over real HTTP. The server records
//! every request it receives, so assertions can look at the headers the
//! client really sent.

use icd_api::{Api, CodeSystem, IcdConfig, IcdError, Include};
use mock_icd_server::{AppState, Catalog, MockConfig, RecordedRequest, CLIENT_ID, CLIENT_SECRET};

/// Start a mock server and return its root URL with the shared state.
fn start_server(config: MockConfig) -> (String, AppState) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let state = AppState::new(config);
    let server_state = state.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_icd_server::run_with_state(listener, server_state).await
        })
        .unwrap();
    });

    (format!("http://{addr}"), state)
}

fn local_api(root: &str) -> Api {
    Api::new(IcdConfig::new(&format!("{root}/icd"))).unwrap()
}

fn authenticated_api(root: &str, client_secret: &str) -> Api {
    let config = IcdConfig::new(&format!("{root}/icd")).with_credentials(
        &format!("{root}/connect/token"),
        CLIENT_ID,
        client_secret,
    );
    Api::new(config).unwrap()
}

fn icd_requests(state: &AppState) -> Vec<RecordedRequest> {
    state
        .recorded_blocking()
        .into_iter()
        .filter(|r| r.path.starts_with("/icd/"))
        .collect()
}

#[test]
fn local_get_entity_returns_exact_document() {
    let (root, state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let entity = api.get_entity("455013390").unwrap();
    assert_eq!(entity, Catalog::sample().foundation_entity("455013390").unwrap());

    let recorded = state.recorded_blocking();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].path, "/icd/entity/455013390");
    assert_eq!(recorded[0].accept_language.as_deref(), Some("en"));
    assert_eq!(recorded[0].api_version.as_deref(), Some("v2"));
    assert!(recorded[0].authorization.is_none());
}

#[test]
fn repeated_get_entity_sends_identical_requests() {
    let (root, state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let first = api.get_entity("257068234").unwrap();
    let second = api.get_entity("257068234").unwrap();
    assert_eq!(first, second);

    let recorded = state.recorded_blocking();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0], recorded[1]);
}

#[test]
fn missing_entity_is_not_found() {
    let (root, _state) = start_server(MockConfig::default());
    let err = local_api(&root).get_entity("1").unwrap_err();
    assert!(matches!(err, IcdError::NotFound { .. }));
}

#[test]
fn search_sends_query_verbatim() {
    let (root, state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let result = api.search_entities("condition").unwrap();
    let hits = result["destinationEntities"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["title"], "Conditions related to sexual health");

    let recorded = state.recorded_blocking();
    assert_eq!(recorded[0].path, "/icd/entity/search");
    assert_eq!(recorded[0].query.as_deref(), Some("q=condition"));
}

#[test]
fn lookup_uses_latest_release_when_none_configured() {
    let (root, state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let entity = api.lookup("257068234").unwrap();
    assert_eq!(entity["code"], "1A00");

    let paths: Vec<String> = state.recorded_blocking().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/icd/release/11/mms", "/icd/release/11/2024-01/mms/lookup"]);
}

#[test]
fn linearization_calls_use_configured_release() {
    let (root, state) = start_server(MockConfig::default());
    let config = IcdConfig::new(&format!("{root}/icd")).with_release_id("2023-01");
    let mut api = Api::new(config).unwrap();

    let entity = api
        .get_linearization_entity("1435254666", Some(Include::Descendant))
        .unwrap();
    assert_eq!(entity["code"], "01");

    let results = api.search_linearization("cholera").unwrap();
    assert_eq!(
        results["destinationEntities"][0]["id"],
        "http://id.who.int/icd/release/11/2023-01/mms/257068234"
    );

    let recorded = state.recorded_blocking();
    assert_eq!(recorded[0].path, "/icd/release/11/mms");
    assert_eq!(recorded[1].path, "/icd/release/11/2023-01/mms/1435254666");
    assert_eq!(recorded[1].query.as_deref(), Some("include=descendant"));
}

#[test]
fn unknown_configured_release_is_configuration_error() {
    let (root, _state) = start_server(MockConfig::default());
    let config = IcdConfig::new(&format!("{root}/icd")).with_release_id("2019-04");
    let err = Api::new(config).unwrap().lookup("257068234").unwrap_err();
    assert!(matches!(err, IcdError::Configuration(_)));
}

#[test]
fn failed_search_is_request_error() {
    let (root, _state) = start_server(MockConfig::default());
    let err = local_api(&root).search_entities("  ").unwrap_err();
    assert!(matches!(err, IcdError::Request { status: Some(200), .. }));
}

#[test]
fn entity_tree_walks_the_foundation() {
    let (root, state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let tree = api.get_entity_tree("455013390").unwrap();
    assert_eq!(tree.ids(), vec!["455013390", "1435254666", "257068234", "1766440644"]);
    assert_eq!(tree.children[0].children[0].entity["title"]["@value"], "Cholera");

    let flat = tree.flatten();
    assert_eq!(flat.len(), 4);
    assert!(flat.iter().all(|node| node.children.is_empty()));
    assert_eq!(state.recorded_blocking().len(), 4);

    let leaves = api.get_leaf_nodes("455013390").unwrap();
    assert_eq!(leaves, vec!["257068234", "1766440644"]);
}

#[test]
fn linearization_relatives_by_id() {
    let (root, _state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    assert_eq!(api.get_linearization_descendant_ids("1435254666").unwrap(), vec!["257068234"]);
    assert_eq!(api.get_linearization_ancestor_ids("257068234").unwrap(), vec!["1435254666"]);
}

#[test]
fn codes_resolve_in_both_classifications() {
    let (root, state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let icd10 = api.get_code(CodeSystem::Icd10, "A00").unwrap();
    assert_eq!(icd10["title"]["@value"], "Cholera");

    let icd11 = api.get_code(CodeSystem::Icd11, "1A00").unwrap();
    assert_eq!(icd11["stemId"], "http://id.who.int/icd/release/11/2024-01/mms/257068234");

    let missing = api.get_code(CodeSystem::Icd11, "XX99").unwrap_err();
    assert!(matches!(missing, IcdError::NotFound { .. }));

    let recorded = state.recorded_blocking();
    assert_eq!(recorded[0].path, "/icd/release/10/A00");
    assert_eq!(recorded[2].path, "/icd/release/11/2024-01/mms/codeinfo/1A00");
    assert_eq!(recorded[2].query.as_deref(), Some("flexiblemode=true"));
}

#[test]
fn residual_codes_report_missing_categories() {
    let (root, _state) = start_server(MockConfig::default());
    let residuals = local_api(&root).get_residual_codes("1435254666").unwrap();
    assert!(residuals.other.is_none());
    assert_eq!(residuals.unspecified.unwrap()["code"], "1A0Z");
}

#[test]
fn entity_releases_list_every_release() {
    let (root, _state) = start_server(MockConfig::default());
    let mut api = local_api(&root);

    let releases = api.get_entity_linearization_releases("257068234").unwrap();
    assert_eq!(releases["release"].as_array().unwrap().len(), 2);
    assert_eq!(
        releases["latestRelease"],
        "http://id.who.int/icd/release/11/2024-01/mms/257068234"
    );

    let err = api.get_entity_linearization_releases("455013390").unwrap_err();
    assert!(matches!(err, IcdError::NotFound { .. }));
}

#[test]
fn get_uri_reaches_any_endpoint() {
    let (root, _state) = start_server(MockConfig::default());
    let doc = local_api(&root).get_uri("release/11/mms").unwrap();
    assert_eq!(doc["@id"], "http://id.who.int/icd/release/11/mms");
}

#[test]
fn authenticated_requests_carry_one_reused_token() {
    let (root, state) = start_server(MockConfig {
        require_auth: true,
        ..MockConfig::default()
    });
    let mut api = authenticated_api(&root, CLIENT_SECRET);

    let token = api.authenticate().unwrap().unwrap();
    assert!(!token.is_empty());

    api.get_entity("455013390").unwrap();
    api.search_entities("cholera").unwrap();
    assert_eq!(state.tokens_issued_blocking(), 1);

    let expected = format!("Bearer {token}");
    for request in icd_requests(&state) {
        assert_eq!(request.authorization.as_deref(), Some(expected.as_str()), "{}", request.path);
    }
}

#[test]
fn wrong_secret_is_authentication_error() {
    let (root, state) = start_server(MockConfig {
        require_auth: true,
        ..MockConfig::default()
    });
    let mut api = authenticated_api(&root, "wrong");

    let err = api.get_entity("455013390").unwrap_err();
    assert!(matches!(err, IcdError::Authentication { status: Some(400), .. }));
    assert!(icd_requests(&state).is_empty());
}

#[test]
fn local_client_against_protected_server_gets_401() {
    let (root, _state) = start_server(MockConfig {
        require_auth: true,
        ..MockConfig::default()
    });
    let err = local_api(&root).get_entity("455013390").unwrap_err();
    assert!(matches!(err, IcdError::Request { status: Some(401), .. }));
}

#[test]
fn check_connection_detects_reachability() {
    let (root, _state) = start_server(MockConfig::default());
    local_api(&root).check_connection().unwrap();

    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let err = local_api(&format!("http://{closed}")).check_connection().unwrap_err();
    assert!(matches!(err, IcdError::Request { status: None, .. }));
}
