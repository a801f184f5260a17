// These tests talk to the live Reddit API and need credentials in
// retriever/config.json (or the file named by $RETRIEVER_CONFIG), so they
// are ignored by default.

use retriever::conf::Credentials;
use retriever::reddit::service::{RedditService, Service};
use retriever::reddit::{Options, Reddit};

fn credentials() -> retriever::conf::RedditCredentials {
    Credentials::load_or_default(None)
        .expect("could not read credentials")
        .reddit
        .expect("no Reddit credentials configured")
}

#[tokio::test]
#[ignore = "requires Reddit API credentials"]
async fn it_authenticates() {
    let service = RedditService::new(credentials());
    service.authenticate().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Reddit API credentials"]
async fn it_retrieves_subreddit_information() {
    let service = RedditService::new(credentials());
    let resp = service.get_resource("/r/modeltrains/about", &[]).await.unwrap();
    assert_ne!(resp, "");
}

#[tokio::test]
#[ignore = "requires Reddit API credentials"]
async fn it_retrieves_subreddit_metadata_in_official_mode() {
    let options = Options::default()
        .use_official(true)
        .credentials(Some(credentials()));
    let reddit = Reddit::new(options).await;
    assert!(reddit.use_official());

    let metadata = reddit.subreddit_metadata("modeltrains").await.unwrap();
    assert_eq!(metadata.display_name.as_deref(), Some("modeltrains"));
}
