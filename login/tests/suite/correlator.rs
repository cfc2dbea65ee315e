use memori_login::FlowCorrelator;
use pretty_assertions::assert_eq;

async fn get(url: &str) -> reqwest::Response {
    reqwest::get(url).await.expect("loopback request")
}

fn cors_header(response: &reqwest::Response) -> Option<&str> {
    response
        .headers()
        .get("Access-Control-Allow-Origin")
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn health_answers_as_soon_as_bound() {
    let correlator = FlowCorrelator::bind(0).expect("bind");
    let response = get(&correlator.health_url()).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(cors_header(&response), Some("*"));
}

#[tokio::test]
async fn flow_endpoint_reports_pending_then_exact_id() {
    let correlator = FlowCorrelator::bind(0).expect("bind");
    let root = format!("http://127.0.0.1:{}/", correlator.actual_port());

    let response = get(&root).await;
    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(cors_header(&response), Some("*"));
    assert_eq!(response.text().await.expect("body"), "pending");

    correlator.publish_flow_id("flow-e2e-42");

    let response = get(&root).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(cors_header(&response), Some("*"));
    assert_eq!(response.text().await.expect("body"), "flow-e2e-42");

    // A second publish does not replace the bound id.
    correlator.publish_flow_id("flow-other");
    let response = get(&root).await;
    assert_eq!(response.text().await.expect("body"), "flow-e2e-42");
}

#[tokio::test]
async fn unknown_paths_get_404_with_cors() {
    let correlator = FlowCorrelator::bind(0).expect("bind");
    let url = format!("http://127.0.0.1:{}/nope", correlator.actual_port());
    let response = get(&url).await;
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(cors_header(&response), Some("*"));
}

#[tokio::test]
async fn taken_preferred_port_falls_back_to_ephemeral() {
    let first = FlowCorrelator::bind(0).expect("bind");
    let taken = first.actual_port();

    let second = FlowCorrelator::bind(taken).expect("bind with fallback");
    assert_ne!(second.actual_port(), taken);
}

#[tokio::test]
async fn drop_releases_the_socket() {
    let correlator = FlowCorrelator::bind(0).expect("bind");
    let port = correlator.actual_port();
    correlator.shutdown();
    // Idempotent stop.
    correlator.shutdown();
    drop(correlator);

    std::net::TcpListener::bind(("127.0.0.1", port)).expect("port should be free again");
}
