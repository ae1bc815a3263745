use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::{BoxFuture, FutureExt};
use nearby_engine::error::CollaboratorResult;
use nearby_engine::{
    fetch_and_recommend, DiscoveryConfig, DiscoverySession, GpsPoint, LocationSource, NearbyQuery,
    PlaceCandidate, PlaceSearch, PlaceVisitRecord, RecommendConfig, UserDirectory, UserGeohash,
    UserRecord, WeightAdjustment, WeightConfig,
};

/// Social graph shared between the test and the session.
#[derive(Default)]
struct Graph {
    users: RwLock<HashMap<String, UserRecord>>,
    costs: RwLock<HashMap<(String, String), f64>>,
}

impl Graph {
    fn befriend(&self, a: &str, b: &str, cost: f64) {
        let mut users = self.users.write().unwrap();
        for (x, y) in [(a, b), (b, a)] {
            users
                .entry(x.to_string())
                .or_insert_with(|| UserRecord::new(x, x, ""))
                .friends
                .insert(y.to_string());
            self.costs.write().unwrap().insert((x.to_string(), y.to_string()), cost);
        }
    }

    fn block(&self, blocker: &str, blocked: &str) {
        if let Some(user) = self.users.write().unwrap().get_mut(blocker) {
            user.blocked_users.insert(blocked.to_string());
        }
    }

    fn unblock(&self, blocker: &str, blocked: &str) {
        if let Some(user) = self.users.write().unwrap().get_mut(blocker) {
            user.blocked_users.remove(blocked);
        }
    }
}

impl UserDirectory for Graph {
    fn fetch_user<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UserRecord>>> {
        async move { Ok(self.users.read().unwrap().get(id).cloned()) }.boxed()
    }

    fn fetch_pair_closeness<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<f64>> {
        async move {
            Ok(self
                .costs
                .read()
                .unwrap()
                .get(&(a.to_string(), b.to_string()))
                .copied()
                .unwrap_or(1.0))
        }
        .boxed()
    }
}

fn ids(profiles: &[nearby_engine::SuggestedProfile]) -> Vec<&str> {
    profiles.iter().map(|p| p.data.id.as_str()).collect()
}

#[tokio::test]
async fn session_tracks_graph_changes() {
    let graph = Graph::default();
    graph.befriend("me", "ann", 1.0);
    graph.befriend("ann", "bob", 1.0);
    graph.befriend("bob", "cat", 1.0);
    graph.befriend("ann", "dan", 2.5);

    let session = DiscoverySession::new(&graph, "me", &DiscoveryConfig::default());
    assert_eq!(session.user_id(), "me");

    let first = session.suggestions().await.unwrap();
    assert_eq!(ids(&first), vec!["bob", "cat", "dan"]);
    let cat_path: Vec<&str> = first[1]
        .friend_path
        .iter()
        .map(|n| n.user_id.as_str())
        .collect();
    assert_eq!(cat_path, vec!["ann", "bob"]);

    // Befriending bob: bob leaves the suggestions, cat moves one hop closer
    graph.befriend("me", "bob", 0.5);
    session.add_connections(&["bob".to_string()]).await.unwrap();
    let after_add = session.suggestions().await.unwrap();
    assert_eq!(ids(&after_add), vec!["cat", "dan"]);
    assert_eq!(after_add[0].degree, 1.5);
    assert_eq!(session.path_to("cat").await.unwrap()[0].user_id, "bob");

    // Blocking dan removes him without a rebuild
    graph.block("me", "dan");
    session.remove_connections(&["dan".to_string()]).await.unwrap();
    assert_eq!(ids(&session.suggestions().await.unwrap()), vec!["cat"]);

    // Unblocking forces a full rebuild, which finds dan again
    graph.unblock("me", "dan");
    let restored = session.suggestions().await.unwrap();
    assert_eq!(ids(&restored), vec!["cat", "dan"]);
}

#[tokio::test]
async fn cached_degrees_match_paths() {
    let graph = Arc::new(Graph::default());
    graph.befriend("me", "a", 0.3);
    graph.befriend("me", "b", 2.0);
    graph.befriend("a", "c", 0.4);
    graph.befriend("b", "c", 0.1);
    graph.befriend("c", "d", 1.2);
    graph.befriend("b", "e", 0.7);
    graph.befriend("e", "d", 0.1);

    let session = DiscoverySession::new(Arc::clone(&graph), "me", &DiscoveryConfig::default());
    let suggestions = session.suggestions().await.unwrap();
    assert!(!suggestions.is_empty());

    let costs = graph.costs.read().unwrap();
    for profile in &suggestions {
        let mut hops = vec!["me".to_string()];
        hops.extend(profile.friend_path.iter().map(|n| n.user_id.clone()));
        hops.push(profile.data.id.clone());
        let sum: f64 = hops
            .windows(2)
            .map(|w| costs[&(w[0].clone(), w[1].clone())])
            .sum();
        assert!((sum - profile.degree).abs() < 1e-9, "{}", profile.data.id);
    }
}

struct StaticLocations {
    active: Vec<UserGeohash>,
    visits: Vec<PlaceVisitRecord>,
}

impl LocationSource for StaticLocations {
    fn fetch_active_locations(&self) -> BoxFuture<'_, CollaboratorResult<Vec<UserGeohash>>> {
        async move { Ok(self.active.clone()) }.boxed()
    }

    fn fetch_visit_history<'a>(
        &'a self,
        _user_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Vec<PlaceVisitRecord>>> {
        async move { Ok(self.visits.clone()) }.boxed()
    }
}

struct StaticPlaces(Vec<PlaceCandidate>);

impl PlaceSearch for StaticPlaces {
    fn search_nearby_places<'a>(
        &'a self,
        _center: GpsPoint,
        _radius_meters: f64,
        category_filter: &'a [String],
    ) -> BoxFuture<'a, CollaboratorResult<Vec<PlaceCandidate>>> {
        async move {
            Ok(self
                .0
                .iter()
                .filter(|p| category_filter.is_empty() || category_filter.contains(&p.primary_type))
                .cloned()
                .collect())
        }
        .boxed()
    }
}

fn candidate(id: &str, lat: f64, lng: f64, kind: &str) -> PlaceCandidate {
    PlaceCandidate {
        id: id.to_string(),
        display_name: id.to_string(),
        address: String::new(),
        primary_type: kind.to_string(),
        location: GpsPoint::new(lat, lng),
    }
}

#[tokio::test]
async fn fetch_and_recommend_ranks_busy_place_first() {
    let graph = Graph::default();
    graph.befriend("me", "ann", 1.0);

    let cafe = GpsPoint::new(37.7749, -122.4194);
    let cafe_hash = nearby_engine::geo_utils::encode_geohash(&cafe, 9).unwrap();
    let locations = StaticLocations {
        active: vec![
            UserGeohash::new("ann", cafe_hash.clone()),
            UserGeohash::new("ghost", cafe_hash),
        ],
        visits: Vec::new(),
    };
    let places = StaticPlaces(vec![
        candidate("quiet", 37.8000, -122.4000, "cafe"),
        candidate("busy", cafe.latitude, cafe.longitude, "cafe"),
        candidate("gym", cafe.latitude, cafe.longitude, "gym"),
    ]);
    let query = NearbyQuery {
        user_id: "me".to_string(),
        center: GpsPoint::new(37.7750, -122.4195),
        radius_meters: 2000.0,
        category_filter: vec!["cafe".to_string()],
    };

    let set = fetch_and_recommend(
        &graph,
        &locations,
        &places,
        &query,
        &WeightConfig::default(),
        &WeightAdjustment::default(),
        &RecommendConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(set.recommendations.len(), 2);
    let busy = &set.recommendations[0];
    assert_eq!(busy.place.id, "busy");
    // ghost does not resolve, so only ann counts
    assert_eq!(busy.user_data.count, 1);
    assert_eq!(busy.user_data.friend_count, 1);
    assert!((set.stats.avg_count - 0.5).abs() < 1e-12);
}
