use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::geo::GeoPoint;

/// Minimal blocking HTTP stub standing in for the routing service.
///
/// Responds to every request with `respond(path)` as a JSON body and tracks
/// request count plus peak concurrent in-flight requests.
struct StubRoutingService {
    endpoint: String,
    hits: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl StubRoutingService {
    fn start<F>(respond: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        let endpoint = format!("http://{}", listener.local_addr().expect("stub addr"));
        let hits = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let respond = Arc::new(respond);

        {
            let hits = Arc::clone(&hits);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    let hits = Arc::clone(&hits);
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    let respond = Arc::clone(&respond);
                    thread::spawn(move || {
                        handle_request(stream, &hits, &in_flight, &peak, respond.as_ref())
                    });
                }
            });
        }

        Self {
            endpoint,
            hits,
            peak,
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn handle_request(
    mut stream: TcpStream,
    hits: &AtomicUsize,
    in_flight: &AtomicUsize,
    peak: &AtomicUsize,
    respond: &(dyn Fn(&str) -> String + Send + Sync),
) {
    hits.fetch_add(1, Ordering::SeqCst);
    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(current, Ordering::SeqCst);

    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                head.extend(&chunk[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    let head = String::from_utf8_lossy(&head);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    // Hold the request open briefly so concurrent overlap is observable.
    thread::sleep(Duration::from_millis(50));

    let body = respond(path);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body,
    );
    let _ = stream.write_all(response.as_bytes());
    in_flight.fetch_sub(1, Ordering::SeqCst);
}

fn ok_body(points: &[GeoPoint], distance_m: f64, duration_s: f64) -> String {
    serde_json::json!({
        "code": "Ok",
        "routes": [{
            "geometry": polyline::encode(points),
            "distance": distance_m,
            "duration": duration_s,
        }],
    })
    .to_string()
}

fn no_route_body() -> String {
    serde_json::json!({ "code": "NoRoute", "routes": [] }).to_string()
}

fn waypoints_near(lng_base: f64) -> Vec<GeoPoint> {
    vec![
        GeoPoint::new(37.70, lng_base),
        GeoPoint::new(37.75, lng_base + 0.02),
    ]
}

#[test]
fn plan_road_route_synthesizes_segments_from_totals() {
    let geometry = vec![
        GeoPoint::new(37.70, -122.45),
        GeoPoint::new(37.72, -122.44),
        GeoPoint::new(37.76, -122.42),
    ];
    let body = ok_body(&geometry, 6000.0, 600.0);
    let stub = StubRoutingService::start(move |_| body.clone());
    let router = RoadRouter::new(&stub.endpoint);

    let path = router
        .plan_road_route(&waypoints_near(-122.45))
        .expect("plan succeeds");

    assert_eq!(path.points.len(), 3);
    assert_eq!(path.segments.len(), 2);
    assert_eq!(path.distance_m, 6000.0);
    assert_eq!(path.duration_s, 600.0);

    let segment_total: f64 = path.segments.iter().map(|s| s.distance_m).sum();
    assert!((segment_total - 6000.0).abs() < 1e-6);
    // The second leg is roughly twice the first, so its share should be too.
    assert!(path.segments[1].distance_m > path.segments[0].distance_m * 1.5);
    for segment in &path.segments {
        assert!((0.0..360.0).contains(&segment.heading_deg));
    }
}

#[test]
fn plan_road_route_single_waypoint_is_identity() {
    // Never reaches the network; the endpoint does not need to resolve.
    let router = RoadRouter::new("http://127.0.0.1:9");
    let waypoint = [GeoPoint::new(37.7, -122.4)];
    let path = router.plan_road_route(&waypoint).expect("identity");
    assert_eq!(path.points, waypoint.to_vec());
    assert!(path.segments.is_empty());
    assert_eq!(path.distance_m, 0.0);
    assert_eq!(path.duration_s, 0.0);
}

#[test]
fn plan_road_route_surfaces_api_failure_code() {
    let stub = StubRoutingService::start(|_| no_route_body());
    let router = RoadRouter::new(&stub.endpoint);

    let err = router
        .plan_road_route(&waypoints_near(-122.45))
        .expect_err("non-Ok code fails");
    match err {
        RoutingError::Api(code) => assert_eq!(code, "NoRoute"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn plan_cache_skips_repeat_requests() {
    let geometry = vec![GeoPoint::new(37.70, -122.45), GeoPoint::new(37.75, -122.43)];
    let body = ok_body(&geometry, 1000.0, 100.0);
    let stub = StubRoutingService::start(move |_| body.clone());
    let router = RoadRouter::new(&stub.endpoint);

    let waypoints = waypoints_near(-122.45);
    let first = router.plan_road_route(&waypoints).expect("first plan");
    let second = router.plan_road_route(&waypoints).expect("cached plan");
    assert_eq!(first, second);
    assert_eq!(stub.hits(), 1);
}

#[test]
fn snap_degrades_failing_route_without_aborting_batch() {
    // Route index 2 lives around lng 99.x; the stub refuses it.
    let stub = StubRoutingService::start(|path| {
        if path.contains("99.") {
            no_route_body()
        } else {
            let geometry = vec![GeoPoint::new(37.70, -122.45), GeoPoint::new(37.75, -122.43)];
            ok_body(&geometry, 1000.0, 100.0)
        }
    });
    let router = RoadRouter::new(&stub.endpoint);

    let routes = vec![
        RoadRoute::from_waypoints("r0", waypoints_near(-122.40)),
        RoadRoute::from_waypoints("r1", waypoints_near(-122.30)),
        RoadRoute::from_waypoints("r2", waypoints_near(99.10)),
        RoadRoute::from_waypoints("r3", waypoints_near(-122.20)),
    ];
    let snapped = router.snap_routes_to_roads(routes);

    assert_eq!(snapped.len(), 4);
    let ids: Vec<&str> = snapped.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["r0", "r1", "r2", "r3"]);
    for (idx, route) in snapped.iter().enumerate() {
        if idx == 2 {
            assert!(route.road.is_none(), "failing route must stay unsnapped");
        } else {
            assert!(route.road.is_some(), "route {idx} should carry a road");
        }
    }
}

#[test]
fn snap_passes_short_routes_through_without_requests() {
    let stub = StubRoutingService::start(|_| no_route_body());
    let router = RoadRouter::new(&stub.endpoint);

    let routes = vec![
        RoadRoute::from_waypoints("solo", vec![GeoPoint::new(37.7, -122.4)]),
        RoadRoute::from_waypoints("empty", Vec::new()),
    ];
    let snapped = router.snap_routes_to_roads(routes);
    assert!(snapped.iter().all(|r| r.road.is_none()));
    assert_eq!(stub.hits(), 0);
}

#[test]
fn snap_concurrency_never_exceeds_worker_pool() {
    let geometry = vec![GeoPoint::new(37.70, -122.45), GeoPoint::new(37.75, -122.43)];
    let body = ok_body(&geometry, 1000.0, 100.0);
    let stub = StubRoutingService::start(move |_| body.clone());
    let router = RoadRouter::new(&stub.endpoint);

    let routes: Vec<RoadRoute> = (0..10)
        .map(|i| {
            RoadRoute::from_waypoints(format!("r{i}"), waypoints_near(-122.40 - i as f64 * 0.01))
        })
        .collect();
    let snapped = router.snap_routes_to_roads(routes);

    assert!(snapped.iter().all(|r| r.road.is_some()));
    let peak = stub.peak_concurrency();
    assert!(peak >= 1 && peak <= SNAP_WORKERS, "peak concurrency {peak}");
}

#[test]
fn downsample_keeps_endpoints_and_respects_cap() {
    let points: Vec<GeoPoint> = (0..2000)
        .map(|i| GeoPoint::new(37.0 + i as f64 * 1e-4, -122.0))
        .collect();
    let first = points[0];
    let last = points[points.len() - 1];

    let reduced = downsample(points);
    assert!(reduced.len() <= MAX_PLAN_POINTS);
    assert_eq!(reduced[0], first);
    assert_eq!(reduced[reduced.len() - 1], last);
}

#[test]
fn downsample_below_cap_is_identity() {
    let points: Vec<GeoPoint> = (0..100)
        .map(|i| GeoPoint::new(37.0 + i as f64 * 1e-4, -122.0))
        .collect();
    assert_eq!(downsample(points.clone()), points);
}
