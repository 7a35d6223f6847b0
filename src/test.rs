use crate::ml::config::{LossKind, OptimizerKind, TrainConfig};
use crate::ml::funcs::{BCELoss, MSELoss, ReLU, Sigmoid};
use crate::ml::metrics::binary_accuracy;
use crate::ml::optim::{Adam, SGD};
use crate::ml::params::{constant, uniform_seeded, xavier_normal_seeded, zeros, Dense};
use crate::ml::progress::{NoopObserver, TrainObserver, TrainingProgress};
use crate::ml::{Layer, Loss, MlError, NetworkState, NeuralNetwork, Optimizer, ParamId, Real};
use crate::sequential;
use crate::tensor::{Tensor, TensorError};

fn assert_tensor<T: Real, const RANK: usize>(a: &Tensor<T, RANK>, b: &Tensor<T, RANK>, message: &str) {
    for (i, (a_i, b_i)) in a.shape().iter().zip(b.shape().iter()).enumerate() {
        assert_eq!(
            a_i, b_i,
            "{}[assert_tensor] shape size is not same a.shape[{i}]={a_i}, b.shape[{i}]={b_i}",
            message
        );
    }

    let tol = T::from(1e-5).unwrap();
    for (i, (a_i, b_i)) in a.iter().zip(b.iter()).enumerate() {
        assert!(
            (*a_i - *b_i).abs() < tol,
            "{}[assert_tensor] data is not same a.data[{i}]={a_i}, b.data[{i}]={b_i}",
            message
        );
    }
}

fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> Tensor<f32, 2> {
    Tensor::from_vec([rows, cols], data).unwrap()
}

#[test]
fn test_add_sub_restores_floats() {
    let a = Tensor::<f32, 3>::from_vec([2, 2, 2], vec![0.1, -2.5, 3.0, 4.25, 1e3, -7.0, 0.0, 9.5]).unwrap();
    let b = Tensor::<f32, 3>::filled([2, 2, 2], 1.75);
    let restored = (&(&a + &b).unwrap() - &b).unwrap();
    assert_tensor(&restored, &a, "(a + b) - b");
}

#[test]
fn test_row_broadcast_adds_to_every_row() {
    let m = matrix(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let row = matrix(1, 2, vec![0.5, -1.0]);
    let out = (&m + &row).unwrap();
    assert_eq!(out.shape(), &[3, 2]);
    for r in 0..3 {
        for c in 0..2 {
            assert_eq!(out[[r, c]], m[[r, c]] + row[[0, c]]);
        }
    }
}

#[test]
fn test_transpose_involution() {
    let t = Tensor::<f32, 4>::from_vec([2, 1, 3, 2], (0..12).map(|v| v as f32).collect()).unwrap();
    let back = t.transpose_2d().unwrap().transpose_2d().unwrap();
    assert_eq!(back, t);
}

#[test]
fn test_identity_product() {
    let m = matrix(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let eye = Tensor::<f32, 2>::identity(3);
    assert_tensor(&m.matmul(&eye).unwrap(), &m, "m * I");
    let eye = Tensor::<f32, 2>::identity(2);
    assert_tensor(&eye.matmul(&m).unwrap(), &m, "I * m");
}

#[test]
fn test_matmul_mismatch_keeps_operands() {
    let a = matrix(2, 3, vec![1.0; 6]);
    let b = matrix(2, 2, vec![2.0; 4]);
    let (a0, b0) = (a.clone(), b.clone());
    assert!(matches!(a.matmul(&b), Err(TensorError::IncompatibleShape(_))));
    assert_eq!(a, a0);
    assert_eq!(b, b0);
}

#[test]
fn test_bce_gradient_sign() {
    let pred = matrix(1, 1, vec![0.5]);
    let target = matrix(1, 1, vec![1.0]);
    let loss = BCELoss::new(&pred, &target).unwrap();
    assert!(loss.loss_gradient()[[0, 0]] < 0.0);
    assert!((loss.loss() - std::f32::consts::LN_2).abs() < 1e-5);
}

#[test]
fn test_bce_gradient_matches_finite_differences() {
    let pred = Tensor::<f64, 2>::from_vec([2, 2], vec![0.2, 0.7, 0.55, 0.9]).unwrap();
    let target = Tensor::<f64, 2>::from_vec([2, 2], vec![0.0, 1.0, 1.0, 0.3]).unwrap();
    let gradient = BCELoss::new(&pred, &target).unwrap().loss_gradient();

    let h = 1e-6;
    for i in 0..2 {
        for j in 0..2 {
            let mut up = pred.clone();
            up[[i, j]] += h;
            let mut down = pred.clone();
            down[[i, j]] -= h;
            let numeric = (BCELoss::new(&up, &target).unwrap().loss()
                - BCELoss::new(&down, &target).unwrap().loss())
                / (2.0 * h);
            assert!((numeric - gradient[[i, j]]).abs() < 1e-6, "dL/dp[{i},{j}]");
        }
    }
}

#[test]
fn test_bce_gradient_uses_clamped_predictions() {
    let pred = Tensor::<f64, 2>::from_vec([2, 1], vec![1.0, 0.0]).unwrap();
    let target = Tensor::<f64, 2>::from_vec([2, 1], vec![0.0, 1.0]).unwrap();
    let loss = BCELoss::new(&pred, &target).unwrap();
    assert!(loss.loss().is_finite());

    let eps = BCELoss::<f64>::EPS;
    let hi = 1.0 - eps;
    let expected_hi = hi / (hi * (1.0 - hi) * 2.0);
    let expected_lo = (eps - 1.0) / (eps * (1.0 - eps) * 2.0);
    let gradient = loss.loss_gradient();
    assert!(gradient.iter().all(|g| g.is_finite()));
    assert!(((gradient[[0, 0]] - expected_hi) / expected_hi).abs() < 1e-9);
    assert!(((gradient[[1, 0]] - expected_lo) / expected_lo).abs() < 1e-9);
}

/// Ten points with `x0 + x1 >= 0.3`, each followed by its mirror image.
fn separable_points() -> (Tensor<f32, 2>, Tensor<f32, 2>) {
    let positives = [
        (0.5, 0.2),
        (1.0, 0.8),
        (0.3, 0.9),
        (1.5, -0.2),
        (-0.2, 1.2),
        (0.8, 0.1),
        (0.2, 0.4),
        (1.1, 1.3),
        (0.6, -0.1),
        (-0.1, 0.7),
    ];
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for &(a, b) in positives.iter() {
        xs.extend([a, b]);
        ys.push(1.0);
        xs.extend([-a, -b]);
        ys.push(0.0);
    }
    (matrix(20, 2, xs), matrix(20, 1, ys))
}

#[test]
fn test_training_convergence() {
    let (x, y) = separable_points();

    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 1, zeros(), zeros()));
    net.add_layer(Sigmoid::new());

    let history = net.train::<BCELoss<f32>, SGD<f32>>(&x, &y, 200, 4, 0.5).unwrap();
    assert_eq!(history.len(), 200);

    let pred = net.predict(&x).unwrap();
    let acc = binary_accuracy(&pred, &y, 0.5).unwrap();
    assert!(acc >= 0.95, "accuracy {acc}");
}

#[test]
fn test_history_loss_decreases() {
    let (x, y) = separable_points();
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 4, xavier_normal_seeded(2, 3), zeros()));
    net.add_layer(ReLU::new());
    net.add_layer(Dense::new(4, 1, xavier_normal_seeded(4, 4), zeros()));
    net.add_layer(Sigmoid::new());

    let history = net.train::<MSELoss<f32>, SGD<f32>>(&x, &y, 50, 5, 0.5).unwrap();
    assert!(history.improved(), "{:?}", history.losses());
}

#[test]
fn test_adam_step_differs_from_sgd() {
    let start = matrix(1, 3, vec![0.5, -0.5, 1.0]);
    let grad = matrix(1, 3, vec![0.2, 0.05, -1.5]);

    let mut by_sgd = start.clone();
    SGD::new(0.01).update(ParamId::next(), &mut by_sgd, &grad).unwrap();
    let mut by_adam = start.clone();
    Adam::new(0.01).update(ParamId::next(), &mut by_adam, &grad).unwrap();

    let sgd_step = (&by_sgd - &start).unwrap();
    let adam_step = (&by_adam - &start).unwrap();
    assert_ne!(sgd_step, adam_step);
}

#[test]
fn test_adam_state_is_per_param() {
    let (a, b) = (ParamId::next(), ParamId::next());
    let grad_a = matrix(1, 2, vec![1.0, -1.0]);
    let grad_b = matrix(1, 2, vec![0.1, 0.3]);

    let mut shared = Adam::new(0.1);
    let mut pa = matrix(1, 2, vec![0.0, 0.0]);
    let mut pb = matrix(1, 2, vec![1.0, 1.0]);
    shared.update(a, &mut pa, &grad_a).unwrap();
    shared.update(b, &mut pb, &grad_b).unwrap();

    let mut alone = Adam::new(0.1);
    let mut pb_alone = matrix(1, 2, vec![1.0, 1.0]);
    alone.update(b, &mut pb_alone, &grad_b).unwrap();

    assert_tensor(&pb, &pb_alone, "param b");
    assert_eq!(shared.tracked_params(), 2);
    assert_ne!(shared.first_moment(a), shared.first_moment(b));
}

#[test]
fn test_predict_idempotent() {
    let (x, _) = separable_points();
    let mut net: NeuralNetwork<f32> = crate::sequential!([
        Dense::new(2, 3, xavier_normal_seeded(2, 11), zeros()),
        ReLU::new(),
        Dense::new(3, 1, xavier_normal_seeded(3, 12), constant(0.1)),
        Sigmoid::new(),
    ]);
    assert_eq!(net.state(), NetworkState::Built);
    let first = net.predict(&x).unwrap();
    let second = net.predict(&x).unwrap();
    assert_eq!(first, second);
    assert_eq!(net.state(), NetworkState::Ready);
    assert_eq!(net.last_output(), Some(&second));
}

#[test]
fn test_dense_single_sgd_step() {
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(1, 1, constant(1.0), zeros()));
    let x = matrix(1, 1, vec![2.0]);
    let y = matrix(1, 1, vec![0.0]);

    net.train::<MSELoss<f32>, SGD<f32>>(&x, &y, 1, 1, 0.1).unwrap();

    match &net.layers()[0] {
        crate::ml::AnyLayer::Dense(dense) => {
            assert_tensor(dense.weights(), &matrix(1, 1, vec![0.2]), "weights");
            assert!((dense.bias()[[0]] + 0.4).abs() < 1e-6);
        }
        other => panic!("unexpected layer {}", other.name()),
    }
}

#[test]
fn test_dense_gradients_match_finite_differences() {
    let x = Tensor::<f64, 2>::from_vec([4, 3], vec![0.3, -1.2, 0.5, 1.0, 0.2, -0.7, -0.4, 0.9, 1.5, 0.1, 0.1, -0.3])
        .unwrap();
    let y = Tensor::<f64, 2>::from_vec([4, 2], vec![1.0, 0.0, 0.5, -0.5, 0.0, 1.0, -1.0, 0.2]).unwrap();
    let mut dense = Dense::<f64>::new(3, 2, xavier_normal_seeded(3, 5), constant(0.1));

    let loss_of = |layer: &mut Dense<f64>| {
        let pred = layer.forward(&x).unwrap();
        MSELoss::new(&pred, &y).unwrap().loss()
    };

    let pred = dense.forward(&x).unwrap();
    let loss = MSELoss::new(&pred, &y).unwrap();
    let input_grad = dense.backward(&loss.loss_gradient()).unwrap();
    assert_eq!(input_grad.shape(), x.shape());
    let weight_grad = dense.weight_grad().clone();
    let bias_grad = dense.bias_grad().clone();

    let h = 1e-6;
    for i in 0..3 {
        for j in 0..2 {
            let w = dense.weights()[[i, j]];
            dense.weights_mut()[[i, j]] = w + h;
            let up = loss_of(&mut dense);
            dense.weights_mut()[[i, j]] = w - h;
            let down = loss_of(&mut dense);
            dense.weights_mut()[[i, j]] = w;
            let numeric = (up - down) / (2.0 * h);
            assert!((numeric - weight_grad[[i, j]]).abs() < 1e-6, "dW[{i},{j}]");
        }
    }
    for j in 0..2 {
        let b = dense.bias()[[j]];
        dense.bias_mut()[[j]] = b + h;
        let up = loss_of(&mut dense);
        dense.bias_mut()[[j]] = b - h;
        let down = loss_of(&mut dense);
        dense.bias_mut()[[j]] = b;
        let numeric = (up - down) / (2.0 * h);
        assert!((numeric - bias_grad[[j]]).abs() < 1e-6, "db[{j}]");
    }
}

#[test]
fn test_backward_before_forward_is_an_error() {
    let mut dense = Dense::<f32>::new(2, 2, zeros(), zeros());
    let err = dense.backward(&matrix(1, 2, vec![1.0, 1.0])).unwrap_err();
    assert_eq!(err, MlError::BackwardBeforeForward { layer: "Dense" });
}

#[test]
fn test_training_preconditions() {
    let (x, y) = separable_points();
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 1, zeros(), zeros()));

    let err = net.train::<MSELoss<f32>, SGD<f32>>(&x, &y, 1, 0, 0.1).unwrap_err();
    assert_eq!(err, MlError::InvalidBatchSize);

    let short = y.slice_rows(0, 10).unwrap();
    let err = net.train::<MSELoss<f32>, SGD<f32>>(&x, &short, 1, 4, 0.1).unwrap_err();
    assert_eq!(err, MlError::RowMismatch { inputs: 20, labels: 10 });
}

#[derive(Default)]
struct CountingObserver {
    epochs: usize,
    batches: usize,
    batches_per_epoch: usize,
}

impl TrainObserver<f32> for CountingObserver {
    fn start_training(&mut self, _epochs: usize, batches_per_epoch: usize) {
        self.batches_per_epoch = batches_per_epoch;
    }

    fn update_batch(&mut self, _loss: f32) {
        self.batches += 1;
    }

    fn finish_epoch(&mut self, _epoch: usize, _avg_loss: f32) {
        self.epochs += 1;
    }
}

#[test]
fn test_last_batch_is_smaller() {
    let (x, y) = separable_points();
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 1, zeros(), zeros()));
    net.add_layer(Sigmoid::new());

    let mut optimizer = Adam::new(0.01);
    let mut observer = CountingObserver::default();
    net.train_with::<BCELoss<f32>, Adam<f32>>(&x, &y, 3, 8, &mut optimizer, &mut observer)
        .unwrap();

    // 20 rows in batches of 8: 8, 8, 4
    assert_eq!(observer.batches_per_epoch, 3);
    assert_eq!(observer.batches, 9);
    assert_eq!(observer.epochs, 3);
    assert_eq!(optimizer.step_count(), 9);
}

#[test]
fn test_fit_dispatches_on_config() {
    let (x, y) = separable_points();
    let config = TrainConfig::default()
        .with_epochs(30)
        .with_batch_size(4)
        .with_learning_rate(0.05)
        .with_loss(LossKind::Bce)
        .with_optimizer(OptimizerKind::adam());

    let mut net = NeuralNetwork::<f64>::new();
    net.add_layer(Dense::new(2, 1, zeros(), zeros()));
    net.add_layer(Sigmoid::new());
    let history = net.fit(&to_f64(&x), &to_f64(&y), &config, &mut NoopObserver).unwrap();
    assert_eq!(history.len(), 30);
    assert!(history.improved());
}

fn to_f64(t: &Tensor<f32, 2>) -> Tensor<f64, 2> {
    Tensor::from_vec(*t.shape(), t.iter().map(|&v| v as f64).collect()).unwrap()
}

#[test]
fn test_param_ids_are_unique() {
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::auto(2, 3));
    net.add_layer(ReLU::new());
    net.add_layer(Dense::auto(3, 1));

    let ids = net.param_ids();
    assert_eq!(ids.len(), 2);
    let mut all: Vec<ParamId> = ids.values().flatten().copied().collect();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 4);
    assert_eq!(net.trainable_layers(), 2);
}

#[test]
fn test_sequential_appends_to_network() {
    let mut net: NeuralNetwork<f32> = sequential!([Dense::new(2, 3, zeros(), zeros())]);
    let last = sequential!(net, [ReLU::new(), Dense::new(3, 1, zeros(), zeros())]);
    assert_eq!(last, 2);
    assert_eq!(net.len(), 3);
    assert_eq!(net.layers()[1].name(), "ReLU");
    assert_eq!(net.trainable_layers(), 2);

    let unchanged = sequential!(net, []);
    assert_eq!(unchanged, 3);
    assert_eq!(net.len(), 3);
}

#[test]
fn test_training_progress_counters() {
    let mut progress = TrainingProgress::quiet();
    TrainObserver::<f32>::start_training(&mut progress, 2, 3);
    assert_eq!(progress.current_epoch(), 0);
    assert_eq!(progress.current_batch(), 0);

    TrainObserver::<f32>::start_epoch(&mut progress, 0);
    for _ in 0..3 {
        TrainObserver::<f32>::update_batch(&mut progress, 0.5);
    }
    assert_eq!(progress.current_epoch(), 1);
    assert_eq!(progress.current_batch(), 3);

    TrainObserver::<f32>::finish_epoch(&mut progress, 0, 0.5);
    TrainObserver::<f32>::start_epoch(&mut progress, 1);
    assert_eq!(progress.current_epoch(), 2);
    assert_eq!(progress.current_batch(), 0);
    TrainObserver::<f32>::update_batch(&mut progress, 0.25);
    assert_eq!(progress.current_batch(), 1);

    // a new run starts counting again
    TrainObserver::<f32>::start_training(&mut progress, 1, 1);
    assert_eq!(progress.current_epoch(), 0);

    let (x, y) = separable_points();
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 1, zeros(), zeros()));
    net.add_layer(Sigmoid::new());
    let mut progress = TrainingProgress::quiet();
    let mut optimizer = SGD::new(0.1);
    net.train_with::<BCELoss<f32>, SGD<f32>>(&x, &y, 2, 8, &mut optimizer, &mut progress)
        .unwrap();
    assert_eq!(progress.current_epoch(), 2);
    assert_eq!(progress.current_batch(), 3);
}

/// Plain SGD that refuses to touch one parameter.
struct RejectParam {
    rejected: ParamId,
    lr: f32,
}

impl Optimizer<f32> for RejectParam {
    fn from_learning_rate(lr: f32) -> Self {
        Self {
            rejected: ParamId::next(),
            lr,
        }
    }

    fn update(&mut self, id: ParamId, params: &mut Tensor<f32, 2>, grads: &Tensor<f32, 2>) -> crate::ml::Result<()> {
        if id == self.rejected {
            return Err(TensorError::IncompatibleShape("rejected parameter".to_string()).into());
        }
        for (p, g) in params.iter_mut().zip(grads.iter()) {
            *p -= self.lr * *g;
        }
        Ok(())
    }
}

#[test]
fn test_dense_failed_update_leaves_layer_unchanged() {
    let mut dense = Dense::<f32>::new(2, 2, constant(0.5), constant(0.1));
    let x = matrix(1, 2, vec![1.0, -2.0]);
    dense.forward(&x).unwrap();
    dense.backward(&matrix(1, 2, vec![1.0, 1.0])).unwrap();
    let weights = dense.weights().clone();
    let bias = dense.bias().clone();

    let (weight_id, bias_id) = dense.param_ids();
    for rejected in [bias_id, weight_id] {
        let mut optimizer = RejectParam { rejected, lr: 0.1 };
        assert!(dense.update_params(&mut optimizer).is_err());
        assert_tensor(dense.weights(), &weights, "weights after failed update");
        assert_tensor(dense.bias(), &bias, "bias after failed update");
    }

    let mut optimizer = RejectParam::from_learning_rate(0.1);
    dense.update_params(&mut optimizer).unwrap();
    assert_tensor(dense.weights(), &matrix(2, 2, vec![0.4, 0.4, 0.7, 0.7]), "weights after update");
    assert!((dense.bias()[[0]] - 0.0).abs() < 1e-6);
}

#[test]
fn test_uniform_seeded_initializer() {
    let a = Dense::<f64>::new(4, 3, uniform_seeded(-0.5, 0.5, 11), zeros());
    let b = Dense::<f64>::new(4, 3, uniform_seeded(-0.5, 0.5, 11), zeros());
    assert_tensor(a.weights(), b.weights(), "same seed");
    assert!(a.weights().iter().all(|&w| (-0.5..0.5).contains(&w)));
    assert!(a.weights().iter().any(|&w| w != a.weights()[[0, 0]]));
}

#[cfg(feature = "logging")]
#[test]
fn test_tensorboard_logger_counts_batches() {
    use crate::ml::logger::TensorBoardLogger;

    let dir = std::env::temp_dir().join(format!("minimum_nn_tb_{}", std::process::id()));
    let (x, y) = separable_points();
    let mut net = NeuralNetwork::<f32>::new();
    net.add_layer(Dense::new(2, 1, zeros(), zeros()));
    net.add_layer(Sigmoid::new());

    let mut logger = TensorBoardLogger::with_log_dir(&dir).with_prefix("test");
    let mut optimizer = SGD::new(0.1);
    net.train_with::<BCELoss<f32>, SGD<f32>>(&x, &y, 2, 8, &mut optimizer, &mut logger)
        .unwrap();
    assert_eq!(logger.get_step(), 6);
    drop(logger);

    assert!(std::fs::read_dir(&dir).unwrap().next().is_some());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_config_defaults() {
    let config = TrainConfig::default();
    assert_eq!(config.epochs, 20);
    assert_eq!(config.batch_size, 8);
    assert_eq!(config.learning_rate, 0.1);
    assert_eq!(config.loss, LossKind::Bce);
    assert_eq!(config.optimizer, OptimizerKind::Sgd);
}

#[cfg(feature = "serialization")]
#[test]
fn test_config_json() {
    let config = TrainConfig::from_json_str(
        r#"{ "epochs": 5, "optimizer": { "kind": "adam", "beta1": 0.8, "beta2": 0.99, "epsilon": 1e-6 } }"#,
    )
    .unwrap();
    assert_eq!(config.epochs, 5);
    assert_eq!(config.batch_size, 8);
    assert_eq!(
        config.optimizer,
        OptimizerKind::Adam {
            beta1: 0.8,
            beta2: 0.99,
            epsilon: 1e-6
        }
    );

    let text = config.to_json_string().unwrap();
    assert_eq!(TrainConfig::from_json_str(&text).unwrap(), config);
    assert!(TrainConfig::from_json_str("{ \"loss\": \"hinge\" }").is_err());
}
