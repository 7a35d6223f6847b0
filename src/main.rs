use minimum_nn::ml::config::{OptimizerKind, TrainConfig};
use minimum_nn::ml::funcs::{BCELoss, ReLU, Sigmoid};
use minimum_nn::ml::metrics::binary_accuracy;
use minimum_nn::ml::optim::SGD;
use minimum_nn::ml::params::{constant, xavier_normal_seeded, zeros, Dense};
use minimum_nn::utills::rand::{normal_with, permutation, seeded};
use minimum_nn::{sequential, MlError, NeuralNetwork, Tensor};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), MlError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    train_separable()?;
    train_xor()?;
    Ok(())
}

/// Two gaussian blobs split by `x0 + x1 = 0`, rows shuffled.
fn make_blobs(n: usize, seed: u64) -> Result<(Tensor<f32, 2>, Tensor<f32, 2>), MlError> {
    let mut rng = seeded(seed);
    let noise = normal_with(&mut rng, n * 2, 0.0, 0.5);
    let order = permutation(&mut rng, n);

    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n);
    for &i in &order {
        let center = if i % 2 == 0 { 1.5 } else { -1.5 };
        xs.push((center + noise[2 * i]) as f32);
        xs.push((center + noise[2 * i + 1]) as f32);
        ys.push(if i % 2 == 0 { 1.0 } else { 0.0 });
    }
    Ok((Tensor::from_vec([n, 2], xs)?, Tensor::from_vec([n, 1], ys)?))
}

fn train_separable() -> Result<(), MlError> {
    let (x, y) = make_blobs(200, 7)?;

    let mut net: NeuralNetwork<f32> = sequential!([
        Dense::new(2, 16, constant(0.01), zeros()),
        ReLU::new(),
        Dense::new(16, 1, constant(0.01), zeros()),
        Sigmoid::new(),
    ]);

    let config = TrainConfig::default().with_optimizer(OptimizerKind::adam()).with_learning_rate(0.01);
    #[cfg(feature = "logging")]
    let mut observer = minimum_nn::ml::logger::TensorBoardLogger::timestamped().with_prefix("blobs");
    #[cfg(not(feature = "logging"))]
    let mut observer = minimum_nn::ml::progress::TrainingProgress::quiet();
    let history = net.fit(&x, &y, &config, &mut observer)?;

    let pred = net.predict(&x)?;
    let acc = binary_accuracy(&pred, &y, 0.5)?;
    info!(
        trainable_layers = net.trainable_layers(),
        first_loss = ?history.first(),
        last_loss = ?history.last(),
        accuracy = acc,
        "separable blobs"
    );
    Ok(())
}

fn train_xor() -> Result<(), MlError> {
    let x = Tensor::from_vec([4, 2], vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0])?;
    let y = Tensor::from_vec([4, 1], vec![0.0, 1.0, 1.0, 0.0])?;

    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 8, xavier_normal_seeded(2, 1), zeros()));
    net.add_layer(ReLU::new());
    net.add_layer(Dense::new(8, 1, xavier_normal_seeded(8, 2), zeros()));
    net.add_layer(Sigmoid::new());

    let history = net.train::<BCELoss<f32>, SGD<f32>>(&x, &y, 2000, 4, 0.5)?;
    let pred = net.predict(&x)?;
    info!(last_loss = ?history.last(), "xor");
    println!("{}", pred);
    Ok(())
}
