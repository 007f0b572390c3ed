//! Prints the CRD manifests as a multi-document YAML stream.

use crds::{ClusterServiceVersion, Subscription};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let documents = [
        serde_yaml::to_string(&Subscription::crd())?,
        serde_yaml::to_string(&ClusterServiceVersion::crd())?,
    ];
    println!("{}", documents.join("---\n"));
    Ok(())
}
