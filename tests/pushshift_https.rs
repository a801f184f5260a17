// These tests talk to the live Pushshift API, which now requires approved
// access, so they are ignored by default. Run them with
// `cargo test -- --ignored` from a network that can reach it.

use retriever::reddit::pushshift::{Archive, PushshiftService, SearchParams};
use retriever::reddit::thing::{Kind, Submission, parse_archive};

#[tokio::test]
#[ignore = "requires access to api.pushshift.io"]
async fn it_searches_submissions() {
    let service = PushshiftService::default();
    let params = SearchParams::default()
        .subreddit("modeltrains")
        .after(1546300800)
        .before(1546905600)
        .size(10);
    let resp = service.search(Kind::Submission, &params).await.unwrap();
    let submissions: Vec<Submission> = parse_archive(&resp).unwrap();
    assert!(submissions.len() <= 10);
}

#[tokio::test]
#[ignore = "requires access to api.pushshift.io"]
async fn it_searches_comments() {
    let service = PushshiftService::default();
    let params = SearchParams::default()
        .link_ids(&["t3_6v7yvh"])
        .filter(&["id", "created_utc", "link_id"])
        .size(5);
    let resp = service.search(Kind::Comment, &params).await.unwrap();
    assert_ne!(resp, "");
}
